//! Words, variables, and the module system.
//!
//! A [`Word`] is the unit of execution: executing it manipulates the
//! interpreter (usually its stack). Concrete words are:
//!
//! - [`PushValueWord`] — pushes a stored value (literals, strings, variables)
//! - [`DefinitionWord`] — user definition; runs its sub-words in order
//! - [`MemoWord`] / [`MemoBangWord`] / [`MemoBangAtWord`] — memoization trio
//!   created by `@:` definitions
//! - [`ExecuteWord`] — renamed delegate used for prefixed imports
//! - [`ModuleWord`] — host-supplied handler with per-word error handlers
//!
//! A [`Module`] is a named scope of words, variables, exports, and
//! sub-modules. Modules are held by shared ownership ([`ModuleRef`]) so that
//! an inline `{name ...}` block, its parent, and the interpreter's registry
//! all see the same module.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::errors::{CodeLocation, ForthicError};
use crate::interpreter::Interpreter;
use crate::values::Value;

/// Shared handle to a module.
pub type ModuleRef = Arc<Mutex<Module>>;

/// Wrap a module into a shared handle.
pub fn module_ref(module: Module) -> ModuleRef {
    Arc::new(Mutex::new(module))
}

/// Future returned by a host word handler.
pub type WordFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ForthicError>> + Send + 'a>>;

/// A host-supplied word handler: an async function over the interpreter.
///
/// Handlers may manipulate the stack and call [`Interpreter::run`]
/// recursively; suspension happens only here, at the host boundary.
pub type WordHandler = for<'a> fn(&'a mut Interpreter) -> WordFuture<'a>;

/// Named mutable value container scoped to a module.
///
/// Looking a variable up as a word pushes the variable *handle* onto the
/// stack, not its contents; reads go through an explicit fetch word.
#[derive(Debug, Clone)]
pub struct Variable {
    name: String,
    value: Value,
}

impl Variable {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    pub fn dup(&self) -> Self {
        self.clone()
    }
}

/// Per-word error handler. Handlers attached to a [`ModuleWord`] are tried
/// in registration order when its handler fails; the first one that returns
/// `Ok` suppresses the error.
#[async_trait]
pub trait WordErrorHandler: Send + Sync {
    async fn handle(
        &self,
        error: &ForthicError,
        word_name: &str,
        interp: &mut Interpreter,
    ) -> Result<(), ForthicError>;
}

/// The executable word contract.
#[async_trait]
pub trait Word: Send + Sync {
    fn name(&self) -> &str;

    /// Where the word was defined, when known.
    fn location(&self) -> Option<&CodeLocation> {
        None
    }

    /// Error handlers consulted on failure. Only host-handler words carry
    /// any; everything else returns an empty list.
    fn error_handlers(&self) -> Vec<Arc<dyn WordErrorHandler>> {
        Vec::new()
    }

    async fn execute(&self, interp: &mut Interpreter) -> Result<(), ForthicError>;
}

/// Word that pushes a stored value onto the stack.
#[derive(Debug, Clone)]
pub struct PushValueWord {
    name: String,
    value: Value,
}

impl PushValueWord {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

#[async_trait]
impl Word for PushValueWord {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, interp: &mut Interpreter) -> Result<(), ForthicError> {
        interp.stack_push(self.value.clone());
        Ok(())
    }
}

/// A sub-word of a definition together with the location recorded for it at
/// compile time.
#[derive(Clone)]
pub struct CompiledWord {
    pub word: Arc<dyn Word>,
    pub location: Option<CodeLocation>,
}

/// User-defined word created by `: NAME ... ;`.
///
/// Executes its sub-words in textual order. Any failure is wrapped as a
/// word-execution error carrying the call-site location (the active
/// tokenizer's current token) and the definition-site location (recorded on
/// the sub-word when it was compiled). An intentional stop passes through
/// unwrapped.
#[derive(Clone)]
pub struct DefinitionWord {
    name: String,
    words: Vec<CompiledWord>,
}

impl DefinitionWord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            words: Vec::new(),
        }
    }

    pub fn add_word(&mut self, word: Arc<dyn Word>, location: Option<CodeLocation>) {
        self.words.push(CompiledWord { word, location });
    }

    pub fn words(&self) -> &[CompiledWord] {
        &self.words
    }
}

#[async_trait]
impl Word for DefinitionWord {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, interp: &mut Interpreter) -> Result<(), ForthicError> {
        for entry in &self.words {
            match entry.word.execute(interp).await {
                Ok(()) => {}
                Err(stop @ ForthicError::IntentionalStop { .. }) => return Err(stop),
                Err(e) => {
                    return Err(ForthicError::WordExecution {
                        message: format!("Error executing {}", self.name),
                        inner_error: Box::new(e),
                        call_location: interp.current_token_location(),
                        definition_location: entry.location.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Memoized word created by `@: NAME ... ;`.
///
/// The first execution runs the inner word and caches the single
/// top-of-stack result; later executions push the cache. The cache lives
/// for the lifetime of the interpreter (reset does not clear it).
pub struct MemoWord {
    name: String,
    word: Arc<dyn Word>,
    cache: Mutex<Option<Value>>,
}

impl MemoWord {
    pub fn new(word: Arc<dyn Word>) -> Self {
        Self {
            name: word.name().to_string(),
            word,
            cache: Mutex::new(None),
        }
    }

    /// Re-run the inner word and replace the cached value.
    pub async fn refresh(&self, interp: &mut Interpreter) -> Result<(), ForthicError> {
        self.word.execute(interp).await?;
        let value = interp.stack_pop()?;
        *self.cache.lock().unwrap() = Some(value);
        Ok(())
    }

    pub fn cached_value(&self) -> Option<Value> {
        self.cache.lock().unwrap().clone()
    }
}

#[async_trait]
impl Word for MemoWord {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, interp: &mut Interpreter) -> Result<(), ForthicError> {
        let needs_refresh = self.cache.lock().unwrap().is_none();
        if needs_refresh {
            self.refresh(interp).await?;
        }
        let value = self.cache.lock().unwrap().clone().unwrap_or(Value::Null);
        interp.stack_push(value);
        Ok(())
    }
}

/// `NAME!` — force a memo refresh without pushing the value.
pub struct MemoBangWord {
    name: String,
    memo: Arc<MemoWord>,
}

impl MemoBangWord {
    pub fn new(memo: Arc<MemoWord>) -> Self {
        Self {
            name: format!("{}!", memo.name()),
            memo,
        }
    }
}

#[async_trait]
impl Word for MemoBangWord {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, interp: &mut Interpreter) -> Result<(), ForthicError> {
        self.memo.refresh(interp).await
    }
}

/// `NAME!@` — refresh a memo and push the fresh value.
pub struct MemoBangAtWord {
    name: String,
    memo: Arc<MemoWord>,
}

impl MemoBangAtWord {
    pub fn new(memo: Arc<MemoWord>) -> Self {
        Self {
            name: format!("{}!@", memo.name()),
            memo,
        }
    }
}

#[async_trait]
impl Word for MemoBangAtWord {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, interp: &mut Interpreter) -> Result<(), ForthicError> {
        self.memo.refresh(interp).await?;
        let value = self.memo.cached_value().unwrap_or(Value::Null);
        interp.stack_push(value);
        Ok(())
    }
}

/// Renamed delegate to another word; used for prefixed imports so that
/// `prefix.name` executes the imported module's word.
#[derive(Clone)]
pub struct ExecuteWord {
    name: String,
    target: Arc<dyn Word>,
}

impl ExecuteWord {
    pub fn new(name: impl Into<String>, target: Arc<dyn Word>) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }
}

#[async_trait]
impl Word for ExecuteWord {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, interp: &mut Interpreter) -> Result<(), ForthicError> {
        self.target.execute(interp).await
    }
}

/// Host-handler word with per-word error handling.
///
/// On failure the attached error handlers are tried in registration order;
/// the first that returns `Ok` suppresses the error. Intentional stops
/// bypass the handler list entirely.
pub struct ModuleWord {
    name: String,
    handler: WordHandler,
    error_handlers: Mutex<Vec<Arc<dyn WordErrorHandler>>>,
}

impl ModuleWord {
    pub fn new(name: impl Into<String>, handler: WordHandler) -> Self {
        Self {
            name: name.into(),
            handler,
            error_handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn add_error_handler(&self, handler: Arc<dyn WordErrorHandler>) {
        self.error_handlers.lock().unwrap().push(handler);
    }

    pub fn remove_error_handler(&self, handler: &Arc<dyn WordErrorHandler>) {
        let mut handlers = self.error_handlers.lock().unwrap();
        if let Some(pos) = handlers.iter().position(|h| Arc::ptr_eq(h, handler)) {
            handlers.remove(pos);
        }
    }

    pub fn clear_error_handlers(&self) {
        self.error_handlers.lock().unwrap().clear();
    }
}

#[async_trait]
impl Word for ModuleWord {
    fn name(&self) -> &str {
        &self.name
    }

    fn error_handlers(&self) -> Vec<Arc<dyn WordErrorHandler>> {
        self.error_handlers.lock().unwrap().clone()
    }

    async fn execute(&self, interp: &mut Interpreter) -> Result<(), ForthicError> {
        match (self.handler)(interp).await {
            Ok(()) => Ok(()),
            Err(stop @ ForthicError::IntentionalStop { .. }) => Err(stop),
            Err(e) => {
                let handlers = self.error_handlers.lock().unwrap().clone();
                for handler in handlers {
                    if handler.handle(&e, &self.name, interp).await.is_ok() {
                        return Ok(());
                    }
                }
                Err(e)
            }
        }
    }
}

/// A named scope of words, variables, exports, and sub-modules.
pub struct Module {
    name: String,
    words: Vec<Arc<dyn Word>>,
    exportable: Vec<String>,
    variables: HashMap<String, Arc<Mutex<Variable>>>,
    modules: HashMap<String, ModuleRef>,
    module_prefixes: HashMap<String, BTreeSet<String>>,
    forthic_code: String,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            words: Vec::new(),
            exportable: Vec::new(),
            variables: HashMap::new(),
            modules: HashMap::new(),
            module_prefixes: HashMap::new(),
            forthic_code: String::new(),
        }
    }

    /// Create a module from Forthic source; run it with
    /// [`Interpreter::run_module_code`].
    pub fn new_with_code(name: impl Into<String>, forthic_code: impl Into<String>) -> Self {
        let mut module = Self::new(name);
        module.forthic_code = forthic_code.into();
        module
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn forthic_code(&self) -> &str {
        &self.forthic_code
    }

    pub fn set_forthic_code(&mut self, code: impl Into<String>) {
        self.forthic_code = code.into();
    }

    // ---- words ----

    pub fn add_word(&mut self, word: Arc<dyn Word>) {
        self.words.push(word);
    }

    /// Add a memoized word plus its `!` and `!@` refresh variants.
    pub fn add_memo_words(&mut self, word: Arc<dyn Word>) -> Arc<MemoWord> {
        let memo = Arc::new(MemoWord::new(word));
        self.words.push(memo.clone());
        self.words.push(Arc::new(MemoBangWord::new(memo.clone())));
        self.words.push(Arc::new(MemoBangAtWord::new(memo.clone())));
        memo
    }

    pub fn add_exportable(&mut self, names: Vec<String>) {
        self.exportable.extend(names);
    }

    pub fn add_exportable_word(&mut self, word: Arc<dyn Word>) {
        self.exportable.push(word.name().to_string());
        self.words.push(word);
    }

    /// Add a host-handler word and export it.
    pub fn add_module_word(&mut self, name: impl Into<String>, handler: WordHandler) -> Arc<ModuleWord> {
        let word = Arc::new(ModuleWord::new(name, handler));
        self.add_exportable_word(word.clone());
        word
    }

    pub fn exportable_words(&self) -> Vec<Arc<dyn Word>> {
        self.words
            .iter()
            .filter(|w| self.exportable.iter().any(|name| name == w.name()))
            .cloned()
            .collect()
    }

    /// Find a word by name: dictionary words newest-first, then variables.
    pub fn find_word(&self, name: &str) -> Option<Arc<dyn Word>> {
        self.find_dictionary_word(name)
            .or_else(|| self.find_variable(name))
    }

    pub fn find_dictionary_word(&self, name: &str) -> Option<Arc<dyn Word>> {
        self.words.iter().rev().find(|w| w.name() == name).cloned()
    }

    /// A variable lookup yields a push-value word that pushes the variable
    /// handle itself.
    pub fn find_variable(&self, varname: &str) -> Option<Arc<dyn Word>> {
        self.variables.get(varname).map(|var| {
            Arc::new(PushValueWord::new(varname, Value::Variable(var.clone()))) as Arc<dyn Word>
        })
    }

    // ---- variables ----

    /// Add a variable if it doesn't already exist. Names starting with `__`
    /// are reserved and rejected.
    pub fn add_variable(&mut self, name: &str, value: Value) -> Result<(), ForthicError> {
        if name.starts_with("__") {
            return Err(ForthicError::InvalidVariableName {
                forthic: String::new(),
                varname: name.to_string(),
                location: None,
                cause: None,
            });
        }
        self.variables
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Variable::new(name, value))));
        Ok(())
    }

    pub fn get_variable(&self, name: &str) -> Option<Arc<Mutex<Variable>>> {
        self.variables.get(name).cloned()
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.variables.keys().cloned().collect()
    }

    /// Drop all variables. Used by interpreter reset.
    pub fn clear_variables(&mut self) {
        self.variables.clear();
    }

    // ---- sub-modules ----

    pub fn find_module(&self, name: &str) -> Option<ModuleRef> {
        self.modules.get(name).cloned()
    }

    /// Record a sub-module and the prefix it was imported under. The prefix
    /// set is what lets [`Module::copy`] rebuild prefixed imports.
    pub fn register_module(&mut self, module_name: impl Into<String>, prefix: impl Into<String>, module: ModuleRef) {
        let module_name = module_name.into();
        self.modules.insert(module_name.clone(), module);
        self.module_prefixes
            .entry(module_name)
            .or_default()
            .insert(prefix.into());
    }

    /// Import a module's exportable words.
    ///
    /// The source is shallow-duplicated; with an empty prefix the words are
    /// added directly, otherwise each is wrapped in an [`ExecuteWord`] named
    /// `prefix.name`. The duplicate is registered as a sub-module.
    pub fn import_module(&mut self, prefix: &str, source: &ModuleRef) {
        let duplicate = source.lock().unwrap().dup();
        let words = duplicate.exportable_words();
        let module_name = duplicate.name().to_string();

        for word in words {
            if prefix.is_empty() {
                self.add_word(word);
            } else {
                let prefixed_name = format!("{}.{}", prefix, word.name());
                self.add_word(Arc::new(ExecuteWord::new(prefixed_name, word)));
            }
        }

        self.register_module(module_name, prefix, module_ref(duplicate));
    }

    /// Shallow duplicate: words and exports are shared handles, variables
    /// are fresh containers with cloned values, sub-modules are shared.
    pub fn dup(&self) -> Module {
        let mut result = Module::new(self.name.clone());
        result.words = self.words.clone();
        result.exportable = self.exportable.clone();
        for (name, var) in &self.variables {
            let copied = var.lock().unwrap().dup();
            result
                .variables
                .insert(name.clone(), Arc::new(Mutex::new(copied)));
        }
        result.modules = self.modules.clone();
        result.forthic_code = self.forthic_code.clone();
        result
    }

    /// Duplicate for interpreter duplication: like [`Module::dup`], then
    /// re-apply `import_module` for every recorded prefix so prefixed
    /// execute-wrappers are rebuilt against the copied module.
    pub fn copy(&self) -> Module {
        let mut result = self.dup();
        for (module_name, prefixes) in &self.module_prefixes {
            if let Some(module) = self.modules.get(module_name) {
                for prefix in prefixes {
                    result.import_module(prefix, module);
                }
            }
        }
        result
    }
}
