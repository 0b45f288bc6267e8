use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use world_js::{
  GcObject, Heap, HeapSnapshot, Owner, Principals, PropertyKey, Realm, Value, WorldError,
  OBJECT_PROTOTYPE,
};

#[derive(Parser)]
#[command(author, version, about = "Inspect and edit a shared world heap snapshot")]
struct Cli {
  /// World snapshot file (JSON).
  #[arg(long, value_name = "PATH")]
  world: PathBuf,

  /// Emit tracing spans (JSON) on stderr.
  #[arg(long)]
  trace: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Create a fresh world with the built-in prototypes and the given principals.
  Init(InitArgs),
  /// Allocate an object and register it under a new name.
  NewObject(NewObjectArgs),
  /// Read a property as a principal and print it as JSON.
  Get(PropertyArgs),
  /// Write a property as a principal.
  Set(SetArgs),
  /// Delete an own property as a principal.
  Delete(PropertyArgs),
  /// Print the enumerable property names of an object as a JSON array.
  Keys(KeysArgs),
}

#[derive(Args)]
struct InitArgs {
  /// Ordinary principal to create (repeatable).
  #[arg(long = "principal", value_name = "NAME")]
  principals: Vec<String>,

  /// Privileged principal to create (repeatable).
  #[arg(long = "system", value_name = "NAME")]
  system: Vec<String>,

  /// Overwrite an existing world file.
  #[arg(long)]
  force: bool,
}

#[derive(Args)]
struct NewObjectArgs {
  /// Principal that owns the new object.
  #[arg(long = "as", value_name = "PRINCIPAL")]
  actor: String,

  /// Name to register the object under.
  #[arg(long)]
  name: String,

  /// Named object to use as the prototype.
  #[arg(long, default_value = OBJECT_PROTOTYPE)]
  parent: String,
}

#[derive(Args)]
struct PropertyArgs {
  /// Acting principal.
  #[arg(long = "as", value_name = "PRINCIPAL")]
  actor: String,

  /// Named object to operate on.
  #[arg(long)]
  object: String,

  /// Property name.
  #[arg(long)]
  property: String,
}

#[derive(Args)]
struct SetArgs {
  #[command(flatten)]
  target: PropertyArgs,

  /// New value as JSON (`null`, booleans, numbers, strings, or `{"undefined": true}`).
  #[arg(
    long,
    value_name = "JSON",
    required_unless_present = "object_value",
    conflicts_with = "object_value"
  )]
  value: Option<String>,

  /// Named object to store as the new value.
  #[arg(long, value_name = "NAME")]
  object_value: Option<String>,
}

#[derive(Args)]
struct KeysArgs {
  /// Named object to enumerate.
  #[arg(long)]
  object: String,
}

enum Failure {
  Denied(String),
  Other(String),
}

impl From<WorldError> for Failure {
  fn from(err: WorldError) -> Self {
    if err.is_permission_denied() {
      Failure::Denied(err.to_string())
    } else {
      Failure::Other(err.to_string())
    }
  }
}

/// A world loaded from disk: the heap, its principals and its named roots.
struct World {
  heap: Heap,
  principals: Principals,
  realm: Realm,
  roots: BTreeMap<String, Value>,
}

impl World {
  fn load(path: &Path) -> Result<Self, Failure> {
    let text = fs::read_to_string(path)
      .map_err(|err| Failure::Other(format!("failed to read {}: {err}", path.display())))?;
    let snapshot: HeapSnapshot = serde_json::from_str(&text)
      .map_err(|err| Failure::Other(format!("invalid world file {}: {err}", path.display())))?;

    let heap = Heap::default();
    let principals = Principals::new();
    let roots = heap.restore(&snapshot, &principals)?;
    let realm = Realm::from_roots(&heap, &roots)?;
    Ok(Self {
      heap,
      principals,
      realm,
      roots,
    })
  }

  fn save(&self, path: &Path) -> Result<(), Failure> {
    let snapshot = self.heap.snapshot(&self.principals, &self.roots)?;
    let text = serde_json::to_string_pretty(&snapshot)
      .map_err(|err| Failure::Other(format!("failed to encode world: {err}")))?;
    fs::write(path, text)
      .map_err(|err| Failure::Other(format!("failed to write {}: {err}", path.display())))?;
    debug!(
      path = %path.display(),
      objects = snapshot.objects.len(),
      "saved world"
    );
    Ok(())
  }

  fn principal(&self, name: &str) -> Result<Owner, Failure> {
    self
      .principals
      .find(name)
      .ok_or_else(|| Failure::Other(format!("unknown principal '{name}'")))
  }

  fn object(&self, name: &str) -> Result<GcObject, Failure> {
    self
      .roots
      .get(name)
      .and_then(Value::as_object)
      .ok_or_else(|| Failure::Other(format!("unknown object '{name}'")))
  }

  /// The name an object is registered under, if any.
  fn name_of(&self, obj: GcObject) -> Option<&str> {
    self
      .roots
      .iter()
      .find(|(_, root)| root.as_object() == Some(obj))
      .map(|(name, _)| name.as_str())
  }

  fn to_json(&self, value: &Value) -> serde_json::Value {
    match value {
      Value::Undefined => json!({ "undefined": true }),
      Value::Null => serde_json::Value::Null,
      Value::Bool(b) => json!(b),
      Value::Number(n) if n.is_finite() => json!(n),
      Value::Number(n) => json!({ "number": non_finite_name(*n) }),
      Value::String(s) => json!(s.as_str()),
      Value::Object(obj) => json!({ "object": self.name_of(*obj) }),
    }
  }
}

fn parse_value(raw: &str) -> Result<Value, Failure> {
  let json: serde_json::Value = serde_json::from_str(raw)
    .map_err(|err| Failure::Other(format!("invalid --value: {err}")))?;
  match json {
    serde_json::Value::Null => Ok(Value::Null),
    serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
    serde_json::Value::Number(n) => n
      .as_f64()
      .map(Value::Number)
      .ok_or_else(|| Failure::Other(format!("unsupported number {n}"))),
    serde_json::Value::String(s) => Ok(Value::from(s.as_str())),
    serde_json::Value::Object(map)
      if map.len() == 1 && map.get("undefined") == Some(&json!(true)) =>
    {
      Ok(Value::Undefined)
    }
    serde_json::Value::Object(map) if map.len() == 1 => match map.get("number") {
      Some(serde_json::Value::String(name)) => non_finite_from_name(name)
        .map(Value::Number)
        .ok_or_else(|| Failure::Other(format!("unsupported number {name:?}"))),
      _ => Err(Failure::Other(format!(
        "unsupported --value {}",
        serde_json::Value::Object(map)
      ))),
    },
    other => Err(Failure::Other(format!("unsupported --value {other}"))),
  }
}

/// JSON has no literal for these, so they travel as `{"number": "<name>"}`.
fn non_finite_name(n: f64) -> &'static str {
  if n.is_nan() {
    "NaN"
  } else if n > 0.0 {
    "Infinity"
  } else {
    "-Infinity"
  }
}

fn non_finite_from_name(name: &str) -> Option<f64> {
  match name {
    "NaN" => Some(f64::NAN),
    "Infinity" => Some(f64::INFINITY),
    "-Infinity" => Some(f64::NEG_INFINITY),
    _ => None,
  }
}

fn init_tracing(enabled: bool) {
  if !enabled {
    return;
  }
  let _ = tracing_subscriber::fmt()
    .with_span_events(FmtSpan::CLOSE)
    .with_max_level(Level::DEBUG)
    .json()
    .with_ansi(false)
    .with_writer(std::io::stderr)
    .try_init();
}

fn run_init(path: &Path, args: InitArgs) -> Result<(), Failure> {
  if path.exists() && !args.force {
    return Err(Failure::Other(format!(
      "{} already exists (use --force to overwrite)",
      path.display()
    )));
  }

  let heap = Heap::default();
  let principals = Principals::new();
  for (name, privileged) in args
    .principals
    .iter()
    .map(|n| (n, false))
    .chain(args.system.iter().map(|n| (n, true)))
  {
    if principals.find(name).is_some() {
      return Err(Failure::Other(format!("duplicate principal '{name}'")));
    }
    if privileged {
      principals.create_privileged(name)?;
    } else {
      principals.create(name)?;
    }
  }
  let realm = Realm::new(&heap)?;
  let roots = realm.roots();
  World {
    heap,
    principals,
    realm,
    roots,
  }
  .save(path)
}

fn run(cli: Cli) -> Result<(), Failure> {
  let path = cli.world.as_path();
  match cli.command {
    Commands::Init(args) => run_init(path, args),
    Commands::NewObject(args) => {
      let mut world = World::load(path)?;
      let actor = world.principal(&args.actor)?;
      if world.roots.contains_key(&args.name) {
        return Err(Failure::Other(format!("object '{}' already exists", args.name)));
      }
      let parent = world.object(&args.parent)?;
      let obj = world.heap.alloc_object(Some(actor), Some(parent))?;
      world.roots.insert(args.name, Value::Object(obj));
      world.save(path)
    }
    Commands::Get(args) => {
      let world = World::load(path)?;
      let actor = world.principal(&args.actor)?;
      let receiver = Value::Object(world.object(&args.object)?);
      let key = PropertyKey::new(&args.property);
      let value = world
        .realm
        .get_property(&world.heap, &receiver, &key, &actor)?;
      println!("{}", world.to_json(&value));
      Ok(())
    }
    Commands::Set(args) => {
      let world = World::load(path)?;
      let actor = world.principal(&args.target.actor)?;
      let receiver = Value::Object(world.object(&args.target.object)?);
      let key = PropertyKey::new(&args.target.property);
      let value = match (&args.value, &args.object_value) {
        (_, Some(name)) => Value::Object(world.object(name)?),
        (Some(raw), None) => parse_value(raw)?,
        (None, None) => return Err(Failure::Other("missing --value".to_string())),
      };
      world
        .realm
        .set_property(&world.heap, &receiver, &key, value, &actor)?;
      world.save(path)
    }
    Commands::Delete(args) => {
      let world = World::load(path)?;
      let actor = world.principal(&args.actor)?;
      let obj = world.object(&args.object)?;
      let key = PropertyKey::new(&args.property);
      if !world.heap.delete_property(obj, &key, &actor)? {
        eprintln!("no own property '{key}' on '{}'", args.object);
      }
      world.save(path)
    }
    Commands::Keys(args) => {
      let world = World::load(path)?;
      let obj = world.object(&args.object)?;
      let keys = world.heap.enumerable_keys(obj)?;
      let names: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
      println!("{}", json!(names));
      Ok(())
    }
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.trace);
  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(Failure::Denied(message)) => {
      eprintln!("{message}");
      ExitCode::from(2)
    }
    Err(Failure::Other(message)) => {
      eprintln!("{message}");
      ExitCode::FAILURE
    }
  }
}
