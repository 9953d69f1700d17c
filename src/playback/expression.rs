//! Avatar expression control with timed decay.
//!
//! Every shown expression arms a decay timer; when it fires and nothing has
//! changed in the meantime the expression is switched off again. A generation
//! counter guards both the timer and explicit resets so a stale timer can
//! never clobber a newer expression.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ExpressionConfig;
use crate::sinks::{AvatarSink, Expression};

/// Owns the avatar's expression parameter.
#[derive(Clone)]
pub struct ExpressionController {
    inner: Arc<Inner>,
}

struct Inner {
    avatar: Arc<dyn AvatarSink>,
    catalog: BTreeMap<String, String>,
    decay: Duration,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    current: Option<Expression>,
    generation: u64,
    decay_timer: Option<CancellationToken>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(s) => s,
            Err(p) => p.into_inner(),
        }
    }
}

impl ExpressionController {
    pub fn new(config: &ExpressionConfig, avatar: Arc<dyn AvatarSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                avatar,
                catalog: config.catalog.clone(),
                decay: config.decay(),
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Map a backend expression name onto the avatar parameter it drives.
    pub fn resolve(&self, name: &str) -> Option<Expression> {
        if self.inner.catalog.is_empty() {
            return Some(Expression {
                name: name.to_owned(),
                parameter: name.to_owned(),
            });
        }
        self.inner.catalog.get(name).map(|parameter| Expression {
            name: name.to_owned(),
            parameter: parameter.clone(),
        })
    }

    /// Show `name` and arm its decay timer. Returns false for unknown names.
    pub fn show(&self, name: &str) -> bool {
        let Some(expression) = self.resolve(name) else {
            warn!(expression = name, "unknown expression; ignoring");
            return false;
        };

        let mut state = self.inner.state();
        state.generation += 1;
        if let Some(timer) = state.decay_timer.take() {
            timer.cancel();
        }
        if let Some(previous) = state.current.take()
            && previous != expression
        {
            self.inner.avatar.show_expression(&previous, false);
        }
        self.inner.avatar.show_expression(&expression, true);
        state.current = Some(expression);

        if self.inner.decay.is_zero() {
            return true;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime; expression decay disabled");
            return true;
        };
        let token = CancellationToken::new();
        state.decay_timer = Some(token.clone());
        let generation = state.generation;
        drop(state);

        runtime.spawn(decay_after(Arc::clone(&self.inner), generation, token));
        true
    }

    /// Return the avatar to neutral. No-op when it already is.
    pub fn reset(&self) {
        let mut state = self.inner.state();
        if state.current.take().is_none() {
            return;
        }
        state.generation += 1;
        if let Some(timer) = state.decay_timer.take() {
            timer.cancel();
        }
        self.inner.avatar.reset_expression();
    }

    /// Expression currently shown, if any.
    pub fn current(&self) -> Option<Expression> {
        self.inner.state().current.clone()
    }
}

async fn decay_after(inner: Arc<Inner>, generation: u64, cancel: CancellationToken) {
    tokio::select! {
        () = cancel.cancelled() => return,
        () = tokio::time::sleep(inner.decay) => {}
    }

    let mut state = inner.state();
    if state.generation != generation {
        return;
    }
    if let Some(expression) = state.current.take() {
        state.generation += 1;
        state.decay_timer = None;
        inner.avatar.show_expression(&expression, false);
        debug!(expression = %expression.name, "expression decayed");
    }
}
