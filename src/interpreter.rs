//! The Forthic execution engine.
//!
//! The interpreter owns a data [`Stack`], a module stack (bottom is always
//! the app module), and a tokenizer stack (nested `run` calls push a new
//! tokenizer above the outer one). Tokens are fetched on demand and
//! dispatched until EOS; word execution is cooperative — every
//! [`Word::execute`] is awaited, and suspension only happens inside host
//! handlers.
//!
//! # Example
//!
//! ```no_run
//! use forthic_core::interpreter::Interpreter;
//! use forthic_core::values::Value;
//!
//! # async fn example() -> Result<(), forthic_core::errors::ForthicError> {
//! let mut interp = Interpreter::new(chrono_tz::UTC);
//! interp.run(": GREET 'Hello, World!' ; GREET").await?;
//! assert_eq!(interp.stack_pop()?, Value::from("Hello, World!"));
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;

use crate::errors::{CodeLocation, ForthicError};
use crate::literals::{self, LiteralHandler};
use crate::module::{
    module_ref, DefinitionWord, Module, ModuleRef, PushValueWord, Word,
};
use crate::tokenizer::{PositionedString, Token, TokenType, Tokenizer};
use crate::values::Value;

// ----------------------------------------------------------------------
// Special words

/// Pushes a module onto the module stack, creating and registering it when
/// new. The empty name selects the app module.
///
/// Immediate: executes even while compiling (and is also compiled into the
/// open definition so re-execution re-enters the module).
pub struct StartModuleWord {
    name: String,
}

impl StartModuleWord {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Word for StartModuleWord {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, interp: &mut Interpreter) -> Result<(), ForthicError> {
        if self.name.is_empty() {
            let app = interp.app_module();
            interp.module_stack_push(app);
            return Ok(());
        }

        let existing = interp.cur_module().lock().unwrap().find_module(&self.name);
        let module = match existing {
            Some(module) => module,
            None => {
                let module = module_ref(Module::new(self.name.clone()));
                let cur = interp.cur_module();
                let cur_is_app = {
                    let mut guard = cur.lock().unwrap();
                    guard.register_module(self.name.clone(), self.name.clone(), module.clone());
                    guard.name().is_empty()
                };
                // Modules created at the top level are visible to
                // use_modules and duplicated interpreters.
                if cur_is_app {
                    interp.register_module(module.clone());
                }
                module
            }
        };
        interp.module_stack_push(module);
        Ok(())
    }
}

/// Pops the current module from the module stack.
pub struct EndModuleWord;

#[async_trait]
impl Word for EndModuleWord {
    fn name(&self) -> &str {
        "}"
    }

    async fn execute(&self, interp: &mut Interpreter) -> Result<(), ForthicError> {
        interp.module_stack_pop()?;
        Ok(())
    }
}

/// Pops values down to the nearest START_ARRAY sentinel, reverses them, and
/// pushes the resulting array.
pub struct EndArrayWord;

#[async_trait]
impl Word for EndArrayWord {
    fn name(&self) -> &str {
        "]"
    }

    async fn execute(&self, interp: &mut Interpreter) -> Result<(), ForthicError> {
        let mut items = Vec::new();
        loop {
            let item = interp.stack_pop()?;
            if matches!(item, Value::ArrayMarker) {
                break;
            }
            items.push(item);
        }
        items.reverse();
        interp.stack_push(Value::Array(items));
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Stack

/// The data stack.
///
/// `push`/`pop`/`peek`/`raw_items` are the *raw* path: positioned strings
/// come back as-is and no underflow bookkeeping happens. Interpreter-level
/// access ([`Interpreter::stack_pop`] / [`Interpreter::stack_peek`]) decays
/// positioned strings and reports underflow with a source location; use it
/// unless you specifically need raw values.
#[derive(Debug, Clone, Default)]
pub struct Stack {
    items: Vec<Value>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: Value) {
        self.items.push(value);
    }

    /// Raw pop: no positioned-string decay, `None` on empty.
    pub fn pop(&mut self) -> Option<Value> {
        self.items.pop()
    }

    /// Raw peek.
    pub fn peek(&self) -> Option<&Value> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item at `index`, 0 being the bottom of the stack.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Stack contents with positioned strings decayed, bottom first.
    pub fn items(&self) -> Vec<Value> {
        self.items.iter().map(|v| v.clone().decay()).collect()
    }

    /// Stack contents as stored, positioned strings included.
    pub fn raw_items(&self) -> &[Value] {
        &self.items
    }

    pub fn set_raw_items(&mut self, items: Vec<Value>) {
        self.items = items;
    }

    pub fn dup(&self) -> Stack {
        self.clone()
    }
}

// ----------------------------------------------------------------------
// Interpreter

/// Error-recovery callback invoked by `run` when execution fails.
///
/// Returning `Ok` makes the interpreter re-enter the current tokenizer;
/// returning `Err` propagates. Called at most `max_attempts` times per
/// `run`; never called for an intentional stop.
#[async_trait]
pub trait RecoveryHandler: Send + Sync {
    async fn handle(
        &self,
        error: &ForthicError,
        interp: &mut Interpreter,
    ) -> Result<(), ForthicError>;
}

/// The Forthic interpreter.
pub struct Interpreter {
    stack: Stack,
    app_module: ModuleRef,
    module_stack: Vec<ModuleRef>,
    /// Shared by reference across duplicated interpreters.
    registered_modules: Arc<Mutex<HashMap<String, ModuleRef>>>,
    tokenizer_stack: Vec<Tokenizer>,

    error_handler: Option<Arc<dyn RecoveryHandler>>,
    max_attempts: usize,

    // Compilation state
    is_compiling: bool,
    is_memo_definition: bool,
    cur_definition: Option<DefinitionWord>,

    /// Location of the positioned string most recently popped, for
    /// diagnostics on the next failing operation.
    string_location: Option<CodeLocation>,

    // Profiling
    is_profiling: bool,
    word_counts: HashMap<String, u64>,
    timestamps: Vec<(String, f64)>,

    custom_literal_handlers: Vec<(u64, LiteralHandler)>,
    next_literal_handler_id: u64,

    timezone: Tz,
}

impl Interpreter {
    pub fn new(timezone: Tz) -> Self {
        let app_module = module_ref(Module::new(""));
        Self {
            stack: Stack::new(),
            app_module: app_module.clone(),
            module_stack: vec![app_module],
            registered_modules: Arc::new(Mutex::new(HashMap::new())),
            tokenizer_stack: Vec::new(),
            error_handler: None,
            max_attempts: 3,
            is_compiling: false,
            is_memo_definition: false,
            cur_definition: None,
            string_location: None,
            is_profiling: false,
            word_counts: HashMap::new(),
            timestamps: Vec::new(),
            custom_literal_handlers: Vec::new(),
            next_literal_handler_id: 0,
            timezone,
        }
    }

    /// Create an interpreter and import the given modules unprefixed.
    pub fn with_modules(modules: Vec<Module>, timezone: Tz) -> Result<Self, ForthicError> {
        let mut interp = Self::new(timezone);
        interp.import_modules(modules)?;
        Ok(interp)
    }

    // ---- configuration ----

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn set_timezone(&mut self, timezone: Tz) {
        self.timezone = timezone;
    }

    pub fn set_error_handler(&mut self, handler: Arc<dyn RecoveryHandler>) {
        self.error_handler = Some(handler);
    }

    pub fn error_handler(&self) -> Option<Arc<dyn RecoveryHandler>> {
        self.error_handler.clone()
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn set_max_attempts(&mut self, max_attempts: usize) {
        self.max_attempts = max_attempts;
    }

    // ---- stack ----

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut Stack {
        &mut self.stack
    }

    pub fn set_stack(&mut self, stack: Stack) {
        self.stack = stack;
    }

    pub fn stack_push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pop the top of the stack. Positioned strings decay to plain strings
    /// and their location is recorded in the last-string-location slot;
    /// popping anything else clears the slot.
    pub fn stack_pop(&mut self) -> Result<Value, ForthicError> {
        let value = match self.stack.pop() {
            Some(value) => value,
            None => {
                return Err(ForthicError::StackUnderflow {
                    forthic: self.top_input_string(),
                    location: self.current_token_location(),
                    cause: None,
                })
            }
        };

        self.string_location = None;
        if let Value::PositionedString(ps) = value {
            let (string, location) = ps.into_parts();
            self.string_location = Some(location);
            return Ok(Value::String(string));
        }
        Ok(value)
    }

    /// Peek at the top of the stack with positioned strings decayed. Does
    /// not touch the last-string-location slot.
    pub fn stack_peek(&self) -> Result<Value, ForthicError> {
        match self.stack.peek() {
            Some(value) => Ok(value.clone().decay()),
            None => Err(ForthicError::StackUnderflow {
                forthic: self.top_input_string(),
                location: self.current_token_location(),
                cause: None,
            }),
        }
    }

    /// Location of the positioned string most recently popped, if the last
    /// pop produced one.
    pub fn string_location(&self) -> Option<&CodeLocation> {
        self.string_location.as_ref()
    }

    // ---- modules ----

    pub fn app_module(&self) -> ModuleRef {
        self.app_module.clone()
    }

    /// The current module (top of the module stack).
    pub fn cur_module(&self) -> ModuleRef {
        self.module_stack
            .last()
            .expect("module stack is never empty")
            .clone()
    }

    pub fn module_stack_push(&mut self, module: ModuleRef) {
        self.module_stack.push(module);
    }

    /// Pop the module stack. The app module at the bottom cannot be popped.
    pub fn module_stack_pop(&mut self) -> Result<ModuleRef, ForthicError> {
        if self.module_stack.len() <= 1 {
            return Err(ForthicError::StackUnderflow {
                forthic: self.top_input_string(),
                location: self.current_token_location(),
                cause: None,
            });
        }
        Ok(self.module_stack.pop().unwrap())
    }

    /// Make a module available by name to `use_modules` and nested `{name`
    /// references. The registry is shared with duplicated interpreters.
    pub fn register_module(&mut self, module: ModuleRef) {
        let name = module.lock().unwrap().name().to_string();
        self.registered_modules.lock().unwrap().insert(name, module);
    }

    pub fn find_module(&self, name: &str) -> Result<ModuleRef, ForthicError> {
        self.registered_modules
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ForthicError::UnknownModule {
                forthic: self.top_input_string(),
                module_name: name.to_string(),
                location: self.string_location.clone(),
                cause: None,
            })
    }

    /// Import registered modules into the app module. Each entry is a
    /// `(name, prefix)` pair; an empty prefix imports unprefixed.
    pub fn use_modules(&mut self, names: &[(&str, &str)]) -> Result<(), ForthicError> {
        for (module_name, prefix) in names {
            let module = self.find_module(module_name)?;
            self.app_module.lock().unwrap().import_module(prefix, &module);
        }
        Ok(())
    }

    /// Register a module and import it into the app module in one step.
    pub fn import_module(&mut self, module: Module, prefix: &str) -> Result<(), ForthicError> {
        let name = module.name().to_string();
        self.register_module(module_ref(module));
        self.use_modules(&[(name.as_str(), prefix)])
    }

    pub fn import_modules(&mut self, modules: Vec<Module>) -> Result<(), ForthicError> {
        for module in modules {
            self.import_module(module, "")?;
        }
        Ok(())
    }

    /// Run a module's stored Forthic source inside that module's scope.
    /// Failures are wrapped with the module's name.
    pub async fn run_module_code(&mut self, module: &ModuleRef) -> Result<(), ForthicError> {
        let (name, code) = {
            let guard = module.lock().unwrap();
            (guard.name().to_string(), guard.forthic_code().to_string())
        };

        self.module_stack_push(module.clone());
        let location = CodeLocation::default().with_source(name.clone());
        let result = self.run_with_location(&code, Some(location)).await;
        self.module_stack_pop()?;

        result.map_err(|e| ForthicError::Module {
            forthic: self.top_input_string(),
            module_name: name,
            inner_error: Box::new(e),
            location: self.string_location.clone(),
        })
    }

    // ---- literals ----

    /// Register a custom literal handler, tried after the standard chain in
    /// registration order. Returns an id for `unregister_literal_handler`.
    pub fn register_literal_handler(&mut self, handler: LiteralHandler) -> u64 {
        let id = self.next_literal_handler_id;
        self.next_literal_handler_id += 1;
        self.custom_literal_handlers.push((id, handler));
        id
    }

    /// Remove a previously registered handler. Returns false when the id is
    /// unknown.
    pub fn unregister_literal_handler(&mut self, id: u64) -> bool {
        let before = self.custom_literal_handlers.len();
        self.custom_literal_handlers.retain(|(handler_id, _)| *handler_id != id);
        self.custom_literal_handlers.len() != before
    }

    /// Try to read a lexeme as a literal; a hit becomes a fresh push-value
    /// word.
    pub fn find_literal_word(&self, name: &str) -> Option<Arc<dyn Word>> {
        let value = self.parse_literal(name)?;
        Some(Arc::new(PushValueWord::new(name, value)))
    }

    fn parse_literal(&self, name: &str) -> Option<Value> {
        literals::to_bool(name)
            .or_else(|| literals::to_float(name))
            .or_else(|| literals::to_zoned_datetime(name, &self.timezone))
            .or_else(|| literals::to_date(name, &self.timezone))
            .or_else(|| literals::to_time(name))
            .or_else(|| literals::to_int(name))
            .or_else(|| {
                self.custom_literal_handlers
                    .iter()
                    .find_map(|(_, handler)| handler(name))
            })
    }

    // ---- word lookup ----

    /// Resolve a name: module stack top-down, then the literal chain.
    pub fn find_word(&self, name: &str) -> Result<Arc<dyn Word>, ForthicError> {
        for module in self.module_stack.iter().rev() {
            if let Some(word) = module.lock().unwrap().find_word(name) {
                return Ok(word);
            }
        }

        if let Some(word) = self.find_literal_word(name) {
            return Ok(word);
        }

        Err(ForthicError::UnknownWord {
            forthic: self.top_input_string(),
            word: name.to_string(),
            location: self.string_location.clone(),
            cause: None,
        })
    }

    // ---- compilation state ----

    pub fn is_compiling(&self) -> bool {
        self.is_compiling
    }

    pub fn cur_definition(&self) -> Option<&DefinitionWord> {
        self.cur_definition.as_ref()
    }

    // ---- profiling ----

    pub fn start_profiling(&mut self) {
        self.is_profiling = true;
        self.word_counts.clear();
        self.timestamps.clear();
    }

    pub fn stop_profiling(&mut self) {
        self.is_profiling = false;
    }

    fn count_word(&mut self, name: &str) {
        if !self.is_profiling {
            return;
        }
        *self.word_counts.entry(name.to_string()).or_insert(0) += 1;
    }

    /// Execution counts per word name, most-executed first.
    pub fn word_histogram(&self) -> Vec<(String, u64)> {
        let mut items: Vec<(String, u64)> = self
            .word_counts
            .iter()
            .map(|(name, count)| (name.clone(), *count))
            .collect();
        items.sort_by(|a, b| b.1.cmp(&a.1));
        items
    }

    pub fn add_timestamp(&mut self, label: &str) {
        let time_ms = Utc::now().timestamp_millis() as f64;
        self.timestamps.push((label.to_string(), time_ms));
    }

    /// Labeled timestamps in insertion order.
    pub fn profile_timestamps(&self) -> &[(String, f64)] {
        &self.timestamps
    }

    // ---- tokenizer access ----

    /// Input of the bottom tokenizer: the source `run` was originally called
    /// with, used for error reports.
    pub fn top_input_string(&self) -> String {
        self.tokenizer_stack
            .first()
            .map(|t| t.input_string().to_string())
            .unwrap_or_default()
    }

    /// Location of the token the active tokenizer is currently on.
    pub fn current_token_location(&self) -> Option<CodeLocation> {
        self.tokenizer_stack.last().map(|t| t.token_location())
    }

    // ---- execution ----

    pub async fn run(&mut self, source: &str) -> Result<(), ForthicError> {
        self.run_with_location(source, None).await
    }

    /// Run Forthic source; token locations are offset by
    /// `reference_location` so nested evaluation points back at the
    /// original source.
    pub async fn run_with_location(
        &mut self,
        source: &str,
        reference_location: Option<CodeLocation>,
    ) -> Result<(), ForthicError> {
        self.tokenizer_stack
            .push(Tokenizer::new(source, reference_location));

        let result = if self.error_handler.is_some() {
            self.run_with_recovery().await
        } else {
            self.continue_run().await
        };

        self.tokenizer_stack.pop();
        result
    }

    /// Recovery loop: on failure invoke the handler and re-enter the current
    /// tokenizer, up to `max_attempts` total attempts. Intentional stops
    /// propagate untouched.
    async fn run_with_recovery(&mut self) -> Result<(), ForthicError> {
        let mut num_attempts = 0;
        loop {
            num_attempts += 1;
            if num_attempts > self.max_attempts {
                return Err(ForthicError::TooManyAttempts {
                    forthic: self.top_input_string(),
                    num_attempts,
                    max_attempts: self.max_attempts,
                    location: None,
                    cause: None,
                });
            }

            match self.continue_run().await {
                Ok(()) => return Ok(()),
                Err(stop @ ForthicError::IntentionalStop { .. }) => return Err(stop),
                Err(e) => {
                    let handler = match self.error_handler.clone() {
                        Some(handler) => handler,
                        None => return Err(e),
                    };
                    handler.handle(&e, self).await?;
                }
            }
        }
    }

    /// Fetch and dispatch tokens from the active tokenizer until EOS.
    async fn continue_run(&mut self) -> Result<(), ForthicError> {
        loop {
            let token = match self.tokenizer_stack.last_mut() {
                Some(tokenizer) => tokenizer.next_token()?,
                None => break,
            };
            // A streaming tokenizer signals incomplete input with None;
            // interpreter tokenizers are non-streaming, so this ends the run.
            let token = match token {
                Some(token) => token,
                None => break,
            };

            let is_eos = token.kind == TokenType::Eos;
            self.handle_token(token).await?;
            if is_eos {
                break;
            }
        }
        Ok(())
    }

    async fn handle_token(&mut self, token: Token) -> Result<(), ForthicError> {
        match token.kind {
            TokenType::String => self.handle_string_token(token).await,
            TokenType::Comment => Ok(()),
            TokenType::StartArray => self.handle_start_array_token(token).await,
            TokenType::EndArray => self.handle_end_array_token(token).await,
            TokenType::StartModule => self.handle_start_module_token(token).await,
            TokenType::EndModule => self.handle_end_module_token(token).await,
            TokenType::StartDef => self.handle_start_definition_token(token, false),
            TokenType::StartMemo => self.handle_start_definition_token(token, true),
            TokenType::EndDef => self.handle_end_definition_token(token),
            TokenType::DotSymbol => self.handle_dot_symbol_token(token).await,
            TokenType::Word => self.handle_word_token(token).await,
            TokenType::Eos => self.handle_eos_token(token),
        }
    }

    async fn handle_string_token(&mut self, token: Token) -> Result<(), ForthicError> {
        let value = Value::PositionedString(PositionedString::new(token.text, token.location));
        self.handle_word(Arc::new(PushValueWord::new("<string>", value)), None)
            .await
    }

    async fn handle_dot_symbol_token(&mut self, token: Token) -> Result<(), ForthicError> {
        let value = Value::PositionedString(PositionedString::new(token.text, token.location));
        self.handle_word(Arc::new(PushValueWord::new("<dot-symbol>", value)), None)
            .await
    }

    async fn handle_start_array_token(&mut self, _token: Token) -> Result<(), ForthicError> {
        self.handle_word(
            Arc::new(PushValueWord::new("<start-array>", Value::ArrayMarker)),
            None,
        )
        .await
    }

    async fn handle_end_array_token(&mut self, _token: Token) -> Result<(), ForthicError> {
        self.handle_word(Arc::new(EndArrayWord), None).await
    }

    /// Module delimiters are immediate *and* compiled: they execute now so
    /// the compiler sees the module switch, and they are appended to the
    /// open definition so re-execution reproduces it.
    async fn handle_start_module_token(&mut self, token: Token) -> Result<(), ForthicError> {
        let word = Arc::new(StartModuleWord::new(token.text));
        if self.is_compiling {
            if let Some(def) = self.cur_definition.as_mut() {
                def.add_word(word.clone(), None);
            }
        }
        self.count_word(word.name());
        word.execute(self).await
    }

    async fn handle_end_module_token(&mut self, _token: Token) -> Result<(), ForthicError> {
        let word = Arc::new(EndModuleWord);
        if self.is_compiling {
            if let Some(def) = self.cur_definition.as_mut() {
                def.add_word(word.clone(), None);
            }
        }
        self.count_word(word.name());
        word.execute(self).await
    }

    fn handle_start_definition_token(
        &mut self,
        token: Token,
        is_memo: bool,
    ) -> Result<(), ForthicError> {
        if self.is_compiling {
            return Err(ForthicError::MissingSemicolon {
                forthic: self.top_input_string(),
                location: Some(token.location),
                cause: None,
            });
        }
        self.cur_definition = Some(DefinitionWord::new(token.text));
        self.is_compiling = true;
        self.is_memo_definition = is_memo;
        Ok(())
    }

    fn handle_end_definition_token(&mut self, token: Token) -> Result<(), ForthicError> {
        let definition = match self.cur_definition.take() {
            Some(definition) if self.is_compiling => definition,
            _ => {
                return Err(ForthicError::ExtraSemicolon {
                    forthic: self.top_input_string(),
                    location: Some(token.location),
                    cause: None,
                })
            }
        };

        let cur_module = self.cur_module();
        if self.is_memo_definition {
            cur_module
                .lock()
                .unwrap()
                .add_memo_words(Arc::new(definition));
        } else {
            cur_module.lock().unwrap().add_word(Arc::new(definition));
        }
        self.is_compiling = false;
        Ok(())
    }

    async fn handle_word_token(&mut self, token: Token) -> Result<(), ForthicError> {
        let word = self.find_word(&token.text)?;
        self.handle_word(word, Some(token.location)).await
    }

    fn handle_eos_token(&mut self, token: Token) -> Result<(), ForthicError> {
        if self.is_compiling {
            return Err(ForthicError::MissingSemicolon {
                forthic: self.top_input_string(),
                location: Some(token.location),
                cause: None,
            });
        }
        Ok(())
    }

    /// Compile or execute a word. While compiling, the word and its
    /// call-site location are recorded into the open definition; otherwise
    /// the profiler counter is bumped and the word is executed.
    async fn handle_word(
        &mut self,
        word: Arc<dyn Word>,
        location: Option<CodeLocation>,
    ) -> Result<(), ForthicError> {
        if self.is_compiling {
            if let Some(def) = self.cur_definition.as_mut() {
                def.add_word(word, location);
            }
            Ok(())
        } else {
            self.count_word(word.name());
            word.execute(self).await
        }
    }

    // ---- lifecycle ----

    /// Clear the stack, app-module variables, module stack, compilation
    /// state, and the last-string-location slot. Registered modules, word
    /// definitions, and memo caches persist.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.app_module.lock().unwrap().clear_variables();
        self.module_stack = vec![self.app_module.clone()];
        self.is_compiling = false;
        self.is_memo_definition = false;
        self.cur_definition = None;
        self.string_location = None;
    }
}

/// Duplicate an interpreter.
///
/// The app module is copied with prefixed imports rebuilt, the data stack is
/// cloned, and the registered-modules map is shared by reference; the error
/// handler and attempt cap carry over. The module stack restarts with just
/// the copied app module and the tokenizer stack starts empty. Memo caches
/// are not duplicated — word handles are shared.
pub fn dup_interpreter(interp: &Interpreter) -> Interpreter {
    let mut result = Interpreter::new(interp.timezone);

    let app_copy = module_ref(interp.app_module.lock().unwrap().copy());
    result.app_module = app_copy.clone();
    result.module_stack = vec![app_copy];

    result.stack = interp.stack.dup();
    result.registered_modules = interp.registered_modules.clone();
    result.error_handler = interp.error_handler.clone();
    result.max_attempts = interp.max_attempts;

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_interp() -> Interpreter {
        Interpreter::new(chrono_tz::UTC)
    }

    #[test]
    fn test_stack_push_pop() {
        let mut stack = Stack::new();
        stack.push(Value::Int(42));
        stack.push(Value::from("hello"));

        assert_eq!(stack.len(), 2);
        assert_eq!(stack.pop(), Some(Value::from("hello")));
        assert_eq!(stack.pop(), Some(Value::Int(42)));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn test_stack_raw_vs_decayed_items() {
        let mut stack = Stack::new();
        stack.push(Value::PositionedString(PositionedString::new(
            "hi",
            CodeLocation::default(),
        )));

        assert!(matches!(stack.raw_items()[0], Value::PositionedString(_)));
        assert_eq!(stack.items()[0], Value::from("hi"));
    }

    #[test]
    fn test_stack_get_indexes_from_bottom() {
        let mut stack = Stack::new();
        stack.push(Value::Int(1));
        stack.push(Value::Int(2));
        assert_eq!(stack.get(0), Some(&Value::Int(1)));
        assert_eq!(stack.get(1), Some(&Value::Int(2)));
        assert_eq!(stack.get(2), None);
    }

    #[tokio::test]
    async fn test_run_literals() {
        let mut interp = new_interp();
        interp.run("42 3.14 TRUE 'hello'").await.unwrap();

        assert_eq!(interp.stack().len(), 4);
        assert_eq!(interp.stack_pop().unwrap(), Value::from("hello"));
        assert_eq!(interp.stack_pop().unwrap(), Value::Bool(true));
        assert_eq!(interp.stack_pop().unwrap(), Value::Float(3.14));
        assert_eq!(interp.stack_pop().unwrap(), Value::Int(42));
    }

    #[tokio::test]
    async fn test_run_array() {
        let mut interp = new_interp();
        interp.run("[1 2 3]").await.unwrap();

        assert_eq!(
            interp.stack_pop().unwrap(),
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[tokio::test]
    async fn test_run_nested_arrays() {
        let mut interp = new_interp();
        interp.run("[1 2 3] [[4 5] [6 7]]").await.unwrap();

        assert_eq!(
            interp.stack_pop().unwrap(),
            Value::Array(vec![
                Value::Array(vec![Value::Int(4), Value::Int(5)]),
                Value::Array(vec![Value::Int(6), Value::Int(7)]),
            ])
        );
        assert_eq!(
            interp.stack_pop().unwrap(),
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[tokio::test]
    async fn test_definition_and_call() {
        let mut interp = new_interp();
        interp.run(": GREET 'Hello, World!' ; GREET").await.unwrap();
        assert_eq!(interp.stack_pop().unwrap(), Value::from("Hello, World!"));
    }

    #[tokio::test]
    async fn test_definition_calling_definition() {
        let mut interp = new_interp();
        interp
            .run(": BASE 10 ; : DERIVED BASE BASE ; DERIVED")
            .await
            .unwrap();
        assert_eq!(interp.stack().len(), 2);
        assert_eq!(interp.stack_pop().unwrap(), Value::Int(10));
        assert_eq!(interp.stack_pop().unwrap(), Value::Int(10));
    }

    #[tokio::test]
    async fn test_comments_ignored() {
        let mut interp = new_interp();
        interp.run("42 # the answer\n43").await.unwrap();
        assert_eq!(interp.stack().len(), 2);
    }

    #[tokio::test]
    async fn test_dot_symbols_push_strings() {
        let mut interp = new_interp();
        interp.run(".symbol .test-123").await.unwrap();

        assert_eq!(interp.stack_pop().unwrap(), Value::from("test-123"));
        assert_eq!(interp.stack_pop().unwrap(), Value::from("symbol"));
    }

    #[tokio::test]
    async fn test_string_location_recorded_on_pop() {
        let mut interp = new_interp();
        interp.run("'hello'").await.unwrap();

        let value = interp.stack_pop().unwrap();
        assert_eq!(value, Value::from("hello"));
        let location = interp.string_location().unwrap();
        assert_eq!(location.start_pos, 1);
        assert_eq!(location.end_pos, Some(6));
    }

    #[tokio::test]
    async fn test_non_string_pop_clears_string_location() {
        let mut interp = new_interp();
        interp.run("'hello' 42").await.unwrap();

        assert_eq!(interp.stack_pop().unwrap(), Value::Int(42));
        assert!(interp.string_location().is_none());

        assert_eq!(interp.stack_pop().unwrap(), Value::from("hello"));
        assert!(interp.string_location().is_some());
    }

    #[tokio::test]
    async fn test_unknown_word_error() {
        let mut interp = new_interp();
        let result = interp.run("NO-SUCH-WORD").await;
        match result.unwrap_err() {
            ForthicError::UnknownWord { word, .. } => assert_eq!(word, "NO-SUCH-WORD"),
            other => panic!("expected UnknownWord, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_semicolon_error() {
        let mut interp = new_interp();
        let result = interp.run(": UNCLOSED 42").await;
        assert!(matches!(
            result.unwrap_err(),
            ForthicError::MissingSemicolon { .. }
        ));
    }

    #[tokio::test]
    async fn test_nested_definition_start_is_missing_semicolon() {
        let mut interp = new_interp();
        let result = interp.run(": A 1 : B 2 ;").await;
        assert!(matches!(
            result.unwrap_err(),
            ForthicError::MissingSemicolon { .. }
        ));
    }

    #[tokio::test]
    async fn test_extra_semicolon_error() {
        let mut interp = new_interp();
        let result = interp.run("42 ;").await;
        assert!(matches!(
            result.unwrap_err(),
            ForthicError::ExtraSemicolon { .. }
        ));
    }

    #[tokio::test]
    async fn test_stack_underflow_has_location() {
        let mut interp = new_interp();
        let result = interp.run("]").await;
        match result.unwrap_err() {
            ForthicError::StackUnderflow { location, .. } => assert!(location.is_some()),
            other => panic!("expected StackUnderflow, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_inline_module_registers_with_interpreter() {
        let mut interp = new_interp();
        interp.run("{mymodule : WORD 42 ; }").await.unwrap();

        let module = interp.find_module("mymodule").unwrap();
        assert_eq!(module.lock().unwrap().name(), "mymodule");
        assert!(module.lock().unwrap().find_word("WORD").is_some());
    }

    #[tokio::test]
    async fn test_empty_module_name_is_app_module() {
        let mut interp = new_interp();
        interp.run("{ : TOP 1 ; } TOP").await.unwrap();
        assert_eq!(interp.stack_pop().unwrap(), Value::Int(1));
    }

    #[tokio::test]
    async fn test_run_module_code_wraps_errors() {
        let mut interp = new_interp();
        let module = module_ref(Module::new_with_code("bad", ": UNCLOSED 42"));

        let result = interp.run_module_code(&module).await;
        match result.unwrap_err() {
            ForthicError::Module { module_name, .. } => assert_eq!(module_name, "bad"),
            other => panic!("expected Module error, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_module_code_defines_into_module() {
        let mut interp = new_interp();
        let module = module_ref(Module::new_with_code("lib", ": HELLO 'hi' ;"));
        interp.run_module_code(&module).await.unwrap();

        assert!(module.lock().unwrap().find_word("HELLO").is_some());
        // Not visible from the app module without an import.
        assert!(interp.app_module().lock().unwrap().find_word("HELLO").is_none());
    }

    #[tokio::test]
    async fn test_literal_chain_order() {
        let interp = new_interp();

        // Date handler accepts only after datetime rejects (no 'T').
        assert!(matches!(
            interp.parse_literal("2020-06-05"),
            Some(Value::Date(_))
        ));
        assert!(matches!(
            interp.parse_literal("2020-06-05T10:15:00Z"),
            Some(Value::DateTime(_))
        ));
        assert!(matches!(interp.parse_literal("3.14"), Some(Value::Float(_))));
        assert!(matches!(interp.parse_literal("42"), Some(Value::Int(42))));
        assert!(matches!(interp.parse_literal("14:30"), Some(Value::Time(_))));
        assert!(interp.parse_literal("GARBAGE").is_none());
    }

    #[tokio::test]
    async fn test_custom_literal_handler_lifecycle() {
        let mut interp = new_interp();
        let id = interp.register_literal_handler(Box::new(|s| {
            s.strip_prefix("0x")
                .and_then(|hex| i64::from_str_radix(hex, 16).ok())
                .map(Value::Int)
        }));

        interp.run("0xFF").await.unwrap();
        assert_eq!(interp.stack_pop().unwrap(), Value::Int(255));

        assert!(interp.unregister_literal_handler(id));
        assert!(!interp.unregister_literal_handler(id));
        assert!(interp.run("0xFF").await.is_err());
    }

    #[tokio::test]
    async fn test_reset_preserves_definitions() {
        let mut interp = new_interp();
        interp.run(": FORTY-TWO 42 ; FORTY-TWO").await.unwrap();
        assert_eq!(interp.stack().len(), 1);

        interp.reset();
        assert!(interp.stack().is_empty());

        interp.run("FORTY-TWO").await.unwrap();
        assert_eq!(interp.stack_pop().unwrap(), Value::Int(42));
    }

    #[tokio::test]
    async fn test_profiling_histogram() {
        let mut interp = new_interp();
        interp.run(": TWICE 7 7 ;").await.unwrap();

        interp.start_profiling();
        interp.run("TWICE TWICE 42").await.unwrap();
        interp.stop_profiling();

        let histogram = interp.word_histogram();
        let twice = histogram.iter().find(|(name, _)| name == "TWICE").unwrap();
        assert_eq!(twice.1, 2);
        let forty_two = histogram.iter().find(|(name, _)| name == "42").unwrap();
        assert_eq!(forty_two.1, 1);
        // Sorted descending by count.
        assert!(histogram[0].1 >= histogram.last().unwrap().1);
    }

    #[tokio::test]
    async fn test_profile_timestamps_in_order() {
        let mut interp = new_interp();
        interp.start_profiling();
        interp.add_timestamp("start");
        interp.add_timestamp("end");

        let stamps = interp.profile_timestamps();
        assert_eq!(stamps.len(), 2);
        assert_eq!(stamps[0].0, "start");
        assert_eq!(stamps[1].0, "end");
        assert!(stamps[1].1 >= stamps[0].1);
    }

    #[tokio::test]
    async fn test_tokenizer_stack_is_empty_after_run() {
        let mut interp = new_interp();
        interp.run("42").await.unwrap();
        assert!(interp.current_token_location().is_none());
        assert_eq!(interp.top_input_string(), "");
    }
}
