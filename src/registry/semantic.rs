use super::InheritedRegistry;
use crate::grammar::{CompositeStrategy, GrammarContainer, SemanticAction};
use crate::parser::CallbackContext;

/// A pluggable executor for semantic actions the engine cannot run itself.
///
/// The engine executes [SemanticAction::Native] directly and resolves
/// [SemanticAction::Callback] through the interpreter's callback table; template
/// and script payloads are delivered here untouched.
pub trait ActionExecutor {
    fn execute_template(&self, body: &str, ctx: &mut CallbackContext) -> Result<(), String>;
    fn execute_script(
        &self,
        lang: &str,
        body: &str,
        ctx: &mut CallbackContext,
    ) -> Result<(), String>;
}

/// The default executor: accepts template payloads without effect and rejects
/// scripts, since the engine assumes no scripting runtime.
#[derive(Default)]
pub struct NoopExecutor;

impl ActionExecutor for NoopExecutor {
    fn execute_template(&self, _body: &str, _ctx: &mut CallbackContext) -> Result<(), String> {
        Ok(())
    }

    fn execute_script(
        &self,
        lang: &str,
        _body: &str,
        _ctx: &mut CallbackContext,
    ) -> Result<(), String> {
        Err(format!("No executor installed for script language '{}'.", lang))
    }
}

/// Registry of semantic actions keyed by `(grammar, production name)`.
#[derive(Default)]
pub struct SemanticActionRegistry {
    inner: InheritedRegistry<SemanticAction>,
}

impl SemanticActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        container: &GrammarContainer,
        grammar: &str,
        name: impl Into<String>,
        action: SemanticAction,
    ) {
        self.inner.register(container, grammar, name, action);
    }

    pub fn get(
        &mut self,
        container: &GrammarContainer,
        grammar: &str,
        name: &str,
    ) -> Option<SemanticAction> {
        self.inner.get(container, grammar, name)
    }

    pub fn get_all(
        &self,
        container: &GrammarContainer,
        grammar: &str,
    ) -> Vec<(String, SemanticAction)> {
        self.inner.get_all(container, grammar)
    }

    pub fn get_direct(&self, grammar: &str) -> Vec<(String, SemanticAction)> {
        self.inner.get_direct(grammar)
    }

    pub fn remove_all(&mut self, container: &GrammarContainer, grammar: &str) {
        self.inner.remove_all(container, grammar);
    }

    pub fn invalidate(&mut self, container: &GrammarContainer, grammar: &str) {
        self.inner.invalidate(container, grammar);
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

/// Run `action` against `ctx`, resolving named callbacks through `resolve` and
/// delegating template/script payloads to `executor`.
pub(crate) fn run_action(
    action: &SemanticAction,
    ctx: &mut CallbackContext,
    resolve: &dyn Fn(&str) -> Option<crate::grammar::NativeCallback>,
    executor: &dyn ActionExecutor,
) -> Result<(), String> {
    match action {
        SemanticAction::Callback(name) => match resolve(name) {
            Some(callback) => {
                callback(ctx);
                Ok(())
            }
            None => Err(format!("Callback '{}' is not registered.", name)),
        },
        SemanticAction::Template(body) => executor.execute_template(body, ctx),
        SemanticAction::Script { lang, body } => executor.execute_script(lang, body, ctx),
        SemanticAction::Native(callback) => {
            callback(ctx);
            Ok(())
        }
        SemanticAction::Composite { actions, strategy } => match strategy {
            CompositeStrategy::Sequence => {
                for action in actions {
                    run_action(action, ctx, resolve, executor)?;
                }
                Ok(())
            }
            CompositeStrategy::FirstSuccess => {
                let mut last_err = "Composite action has no members.".to_string();
                for action in actions {
                    match run_action(action, ctx, resolve, executor) {
                        Ok(()) => return Ok(()),
                        Err(err) => last_err = err,
                    }
                }
                Err(last_err)
            }
        },
    }
}
