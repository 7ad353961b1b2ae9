//! Execution driver.
//!
//! An [`Interpreter`] owns everything a running program shares: the prelude
//! namespace, the extension table, the host type registry, the module cache
//! and the execution bookkeeping used to build error traces. Modules are
//! compiled to closures once and then run against their own namespace.

pub mod loader;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Write as _};
use std::path::Path;
use std::rc::Rc;

use indexmap::IndexMap;
use log::{debug, info};

use self::loader::{FileLoader, ModuleLoader};
use crate::builtins;
use crate::compiler::{self, ModuleCode};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::host::{HostType, HostTypeDef, TypeKey, TypeRegistry};
use crate::parser;
use crate::runtime::callable::Function;
use crate::runtime::class::Class;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use crate::runtime::execution::ExecutionState;
use crate::runtime::extension::ExtensionTable;
use crate::runtime::object;
use crate::runtime::value::{Globals, Value};

const PRELUDE: &str = include_str!("prelude.py");
const PRELUDE_NAME: &str = "builtins";
const TOP_LEVEL: &str = "<module>";

/// A module namespace.
pub struct Module {
    name: Rc<str>,
    globals: Globals,
}

impl Module {
    pub fn new(name: impl AsRef<str>) -> Rc<Self> {
        Rc::new(Self {
            name: Rc::from(name.as_ref()),
            globals: Rc::new(RefCell::new(IndexMap::new())),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shared_name(&self) -> Rc<str> {
        self.name.clone()
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.globals.borrow_mut().insert(name.into(), value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.globals.borrow_mut().shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.globals.borrow().contains_key(name)
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("globals", &self.globals.borrow().len())
            .finish()
    }
}

pub struct Interpreter {
    config: Config,
    state: ExecutionState,
    object_class: Rc<Class>,
    extensions: ExtensionTable,
    types: TypeRegistry,
    prelude: RefCell<Option<Rc<Module>>>,
    modules: RefCell<HashMap<String, Rc<Module>>>,
    loader: Box<dyn ModuleLoader>,
    output: RefCell<String>,
}

impl Interpreter {
    /// Builds an interpreter and runs its prelude.
    pub fn new(config: Config) -> Result<Self> {
        let loader = Box::new(FileLoader::new(config.search_paths.clone()));
        let interpreter = Self {
            state: ExecutionState::new(config.max_call_depth),
            object_class: object::object_class(),
            extensions: ExtensionTable::new(),
            types: TypeRegistry::with_std(),
            prelude: RefCell::new(None),
            modules: RefCell::new(HashMap::new()),
            loader,
            output: RefCell::new(String::new()),
            config,
        };
        interpreter.load_prelude()?;
        Ok(interpreter)
    }

    /// Replaces the module loader used by `import`.
    pub fn with_loader(mut self, loader: impl ModuleLoader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn object_class(&self) -> Rc<Class> {
        self.object_class.clone()
    }

    pub fn extensions(&self) -> &ExtensionTable {
        &self.extensions
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn prelude(&self) -> Option<Rc<Module>> {
        self.prelude.borrow().clone()
    }

    fn load_prelude(&self) -> Result<()> {
        let module = Module::new(PRELUDE_NAME);
        builtins::install(self, &module);
        let source = match &self.config.prelude {
            Some(path) => fs::read_to_string(path).map_err(|source| Error::io(path, source))?,
            None => PRELUDE.to_string(),
        };
        let code = self.prepare(&module, &source, false)?;
        self.finish(self.run_code(&module, &code))?;
        info!(
            "prelude loaded ({} bindings)",
            module.globals().borrow().len()
        );
        *self.prelude.borrow_mut() = Some(module);
        Ok(())
    }

    /// A fresh namespace seeded with the prelude's bindings.
    pub fn new_module(&self, name: &str) -> Rc<Module> {
        let module = Module::new(name);
        if let Some(prelude) = self.prelude.borrow().as_ref() {
            let seeded = prelude.globals().borrow().clone();
            module.globals().borrow_mut().extend(seeded);
        }
        module.set("__name__", Value::str(name));
        module
    }

    /// Compiles and runs `source` as a new module called `name`.
    pub fn run_source(&self, name: &str, source: &str) -> Result<Rc<Module>> {
        let module = self.new_module(name);
        let code = self.prepare(&module, source, false)?;
        debug!("executing module {name}");
        self.finish(self.run_code(&module, &code))?;
        Ok(module)
    }

    /// Runs a script file as `__main__`.
    pub fn run_file(&self, path: impl AsRef<Path>) -> Result<Rc<Module>> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| Error::io(path, source))?;
        self.run_source("__main__", &source)
    }

    /// Runs `source` against an existing module without re-running the
    /// module itself. A trailing expression becomes the result.
    pub fn eval_snippet(&self, module: &Module, source: &str) -> Result<Value> {
        debug!("evaluating snippet in {}", module.name());
        let code = self.prepare(module, source, true)?;
        self.finish(self.run_code(module, &code))
    }

    /// Calls the function bound to `name` in `module`.
    pub fn call_function(&self, module: &Module, name: &str, args: Vec<Value>) -> Result<Value> {
        let function = match module.get(name) {
            Some(function @ (Value::Function(_) | Value::BoundMethod(_) | Value::Class(_))) => function,
            Some(other) => {
                return Err(RuntimeError::type_error(format!(
                    "'{}' object is not callable",
                    other.type_name()
                ))
                .into());
            }
            None => return Err(RuntimeError::Name(name.to_string()).into()),
        };
        let _module = self.state.enter_module(module.shared_name(), module.globals().clone());
        self.finish(function.call(self, args))
    }

    /// Makes `function` a member of every value of host type `key`.
    pub fn register_extension(&self, key: TypeKey, name: &str, function: Rc<Function>) {
        self.extensions.register(key, name, function);
    }

    /// Convenience for extensions implemented in Rust.
    pub fn register_native_extension(
        &self,
        key: TypeKey,
        name: &str,
        routine: impl Fn(&Interpreter, Vec<Value>) -> RuntimeResult<Value> + 'static,
    ) {
        self.register_extension(key, name, Rc::new(Function::native(name, routine)));
    }

    /// Registers an embedder type and exposes its marker to modules created
    /// from now on.
    pub fn register_host_type(&self, def: HostTypeDef) -> HostType {
        let ty = self.types.register(def);
        if let Some(prelude) = self.prelude.borrow().as_ref() {
            prelude.set(ty.name(), Value::Type(ty.clone()));
        }
        ty
    }

    /// Resolves `import path`, running the module on first use.
    pub fn import(&self, path: &str) -> RuntimeResult<Rc<Module>> {
        if let Some(module) = self.modules.borrow().get(path) {
            return Ok(module.clone());
        }
        let source = self
            .loader
            .load(path)
            .map_err(|error| RuntimeError::Import(format!("cannot load module '{path}': {error}")))?
            .ok_or_else(|| RuntimeError::Import(format!("No module named '{path}'")))?;
        debug!("importing {path}");
        let module = self.new_module(path);
        let code = self
            .prepare(&module, &source, false)
            .map_err(|error| RuntimeError::Import(format!("{error} in module '{path}'")))?;
        // Cached before running so that import cycles see the partial module.
        self.modules.borrow_mut().insert(path.to_string(), module.clone());
        if let Err(error) = self.run_code(&module, &code) {
            self.modules.borrow_mut().remove(path);
            return Err(error);
        }
        Ok(module)
    }

    /// Values for `from path import names`. A name the module does not bind
    /// is tried as a submodule.
    pub fn import_names(&self, path: &str, names: &[String]) -> RuntimeResult<Vec<Value>> {
        let module = self.import(path)?;
        names
            .iter()
            .map(|name| match module.get(name) {
                Some(value) => Ok(value),
                None => match self.import(&format!("{path}.{name}")) {
                    Ok(submodule) => Ok(Value::Module(submodule)),
                    Err(RuntimeError::Import(_)) => Err(RuntimeError::Import(format!(
                        "cannot import name '{name}' from '{path}'"
                    ))),
                    Err(error) => Err(error),
                },
            })
            .collect()
    }

    /// Whether `path` has already been imported.
    pub fn is_loaded(&self, path: &str) -> bool {
        self.modules.borrow().contains_key(path)
    }

    /// Output of `print`; collected when output is captured.
    pub fn write_output(&self, text: &str) {
        if self.config.capture_output {
            self.output.borrow_mut().push_str(text);
        } else {
            let mut stdout = io::stdout().lock();
            let _ = stdout.write_all(text.as_bytes());
            let _ = stdout.flush();
        }
    }

    pub fn take_output(&self) -> String {
        std::mem::take(&mut *self.output.borrow_mut())
    }

    fn prepare(&self, module: &Module, source: &str, interactive: bool) -> Result<ModuleCode> {
        let program = parser::parse(source)?;
        Ok(compiler::compile_module(self, &program, module, interactive)?)
    }

    fn run_code(&self, module: &Module, code: &ModuleCode) -> RuntimeResult<Value> {
        let line = self.state.line();
        let _module = self.state.enter_module(module.shared_name(), module.globals().clone());
        let result = code(self);
        if result.is_err() {
            self.state.record_frame(TOP_LEVEL);
        }
        self.state.set_line(line);
        result
    }

    /// Attaches the collected trace to a failure leaving the interpreter.
    fn finish<T>(&self, result: RuntimeResult<T>) -> Result<T> {
        let trace = self.state.take_trace();
        result.map_err(|error| Error::Runtime { error, trace })
    }
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("config", &self.config)
            .field("modules", &self.modules.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::loader::MemoryLoader;
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn interpreter() -> Interpreter {
        Interpreter::new(Config::captured()).expect("interpreter")
    }

    #[test]
    fn modules_are_seeded_from_the_prelude() {
        let rt = interpreter();
        let module = rt.new_module("demo");
        assert!(module.contains("print"));
        assert!(module.contains("Exception"));
        assert_eq!(module.get("__name__"), Some(Value::str("demo")));
    }

    #[test]
    fn print_output_is_captured() {
        let rt = interpreter();
        rt.run_source("demo", "print('a', 1, sep='-')\nprint('b', end='!')").expect("run");
        assert_eq!(rt.take_output(), "a-1\nb!");
    }

    #[test]
    fn snippets_see_the_module_namespace() {
        let rt = interpreter();
        let module = rt.run_source("demo", "x = 20").expect("run");
        assert_eq!(rt.eval_snippet(&module, "y = x + 1\ny * 2").expect("eval"), Value::Int(42));
        assert_eq!(module.get("y"), Some(Value::Int(21)));
    }

    #[test]
    fn runtime_errors_carry_a_trace() {
        let rt = interpreter();
        let source = indoc! {"
            def inner():
                return missing

            def outer():
                return inner()

            outer()
        "};
        let error = rt.run_source("demo", source).expect_err("fails");
        assert_eq!(error.to_string(), "NameError: name 'missing' is not defined");
        let frames: Vec<String> = error.trace().iter().map(ToString::to_string).collect();
        assert_eq!(frames, vec!["at inner, line 2", "at outer, line 5", "at <module>, line 7"]);
    }

    #[test]
    fn call_function_invokes_a_module_binding() {
        let rt = interpreter();
        let module = rt.run_source("demo", "def add(a, b):\n    return a + b").expect("run");
        let sum = rt
            .call_function(&module, "add", vec![Value::Int(2), Value::Int(3)])
            .expect("call");
        assert_eq!(sum, Value::Int(5));
        assert!(rt.call_function(&module, "nothing", Vec::new()).is_err());
    }

    #[test]
    fn imports_are_cached_per_interpreter() {
        let loader = MemoryLoader::new()
            .with_module("counter", "print('loading')\nvalue = 7")
            .with_module("pkg.tools", "def double(x):\n    return x * 2");
        let rt = interpreter().with_loader(loader);
        let source = indoc! {"
            import counter
            import counter
            from pkg.tools import double
            result = double(counter.value)
        "};
        let module = rt.run_source("demo", source).expect("run");
        assert_eq!(module.get("result"), Some(Value::Int(14)));
        assert_eq!(rt.take_output(), "loading\n");
        assert!(rt.is_loaded("pkg.tools"));
    }

    #[test]
    fn missing_modules_raise_import_errors() {
        let rt = interpreter().with_loader(MemoryLoader::new());
        let error = rt.run_source("demo", "import nowhere").expect_err("fails");
        assert_eq!(error.to_string(), "ImportError: No module named 'nowhere'");
    }
}
