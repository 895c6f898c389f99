// ============================================================================
// spark-bindings - Errors
// Error taxonomy and the channel that routes errors nobody is waiting on
// ============================================================================

use std::cell::RefCell;
use std::rc::Rc;

// =============================================================================
// REACTIVE ERROR
// =============================================================================

/// Errors raised by observers, bindings and the flush queue.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReactiveError {
    /// An expression failed while being evaluated.
    #[error("evaluation of `{expression}` failed: {message}")]
    Evaluation { expression: String, message: String },

    /// The expression has no assignable location.
    #[error("expression `{0}` is not assignable")]
    NotAssignable(String),

    /// The property has a getter but no setter, or the accessor cannot be written.
    #[error("property `{0}` is read-only")]
    ReadOnly(String),

    /// Tried to read or observe a property of `undefined`/`null`.
    #[error("cannot access property `{key}` of {target}")]
    NullTarget { key: String, target: &'static str },

    /// The target kind exposes no observable slot for this key.
    #[error("property `{key}` of {target} cannot be observed")]
    UnobservableKey { key: String, target: &'static str },

    /// A programming error detected at bind time.
    #[error("misuse: {0}")]
    Misuse(String),

    /// `exit` was called with a tracker that is not on top of the stack.
    #[error("dependency tracker exit does not match the innermost active tracker")]
    TrackerMismatch,

    /// Several subscribers failed during one pass.
    #[error("{} errors raised during one notification pass", .0.len())]
    Aggregate(Vec<ReactiveError>),
}

pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

impl ReactiveError {
    /// Build an evaluation error for the given expression description.
    pub fn evaluation(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Evaluation {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Collapse errors from one pass into a single error, if any.
    pub fn collect(mut errors: Vec<ReactiveError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ReactiveError::Aggregate(errors)),
        }
    }

    /// Number of leaf errors carried by this error.
    pub fn count(&self) -> usize {
        match self {
            ReactiveError::Aggregate(inner) => inner.iter().map(ReactiveError::count).sum(),
            _ => 1,
        }
    }
}

// =============================================================================
// ERROR CHANNEL
// =============================================================================

/// Callback receiving errors that would otherwise be thrown at the caller.
pub type ErrorSink = Rc<dyn Fn(&ReactiveError)>;

/// Routes errors to the configured sink.
///
/// Without a sink, synchronous errors go back to the caller and errors from
/// scheduled work are logged and retained for `take_unhandled`.
#[derive(Default)]
pub struct ErrorChannel {
    sink: RefCell<Option<ErrorSink>>,
    unhandled: RefCell<Vec<ReactiveError>>,
}

impl ErrorChannel {
    pub fn new(sink: Option<ErrorSink>) -> Self {
        Self {
            sink: RefCell::new(sink),
            unhandled: RefCell::new(Vec::new()),
        }
    }

    pub fn set_sink(&self, sink: Option<ErrorSink>) {
        *self.sink.borrow_mut() = sink;
    }

    pub fn has_sink(&self) -> bool {
        self.sink.borrow().is_some()
    }

    /// Surface the result of a synchronous pass.
    ///
    /// With a sink installed the error is delivered there and `Ok` is returned.
    pub fn surface(&self, result: Result<()>) -> Result<()> {
        let Err(err) = result else {
            return Ok(());
        };
        let sink = self.sink.borrow().clone();
        match sink {
            Some(sink) => {
                tracing::warn!(error = %err, "routing notification error to sink");
                sink(&err);
                Ok(())
            }
            None => Err(err),
        }
    }

    /// Report an error raised by work that has no synchronous caller.
    pub fn report_unhandled(&self, err: ReactiveError) {
        let sink = self.sink.borrow().clone();
        match sink {
            Some(sink) => {
                tracing::warn!(error = %err, "routing unhandled error to sink");
                sink(&err);
            }
            None => {
                tracing::error!(error = %err, "unhandled error in scheduled work");
                self.unhandled.borrow_mut().push(err);
            }
        }
    }

    /// Drain errors retained because no sink was configured.
    pub fn take_unhandled(&self) -> Vec<ReactiveError> {
        self.unhandled.replace(Vec::new())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn collect_zero_one_many() {
        assert!(ReactiveError::collect(vec![]).is_ok());

        let one = ReactiveError::collect(vec![ReactiveError::TrackerMismatch]);
        assert_eq!(one, Err(ReactiveError::TrackerMismatch));

        let many = ReactiveError::collect(vec![
            ReactiveError::TrackerMismatch,
            ReactiveError::Misuse("x".into()),
        ])
        .unwrap_err();
        assert_eq!(many.count(), 2);
    }

    #[test]
    fn surface_without_sink_returns_error() {
        let channel = ErrorChannel::default();
        let result = channel.surface(Err(ReactiveError::ReadOnly("a".into())));
        assert_eq!(result, Err(ReactiveError::ReadOnly("a".into())));
    }

    #[test]
    fn surface_with_sink_delivers_and_succeeds() {
        let seen = Rc::new(Cell::new(0));
        let seen_clone = seen.clone();
        let channel = ErrorChannel::new(Some(Rc::new(move |_| seen_clone.set(seen_clone.get() + 1))));

        assert!(channel.surface(Err(ReactiveError::TrackerMismatch)).is_ok());
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn unhandled_errors_are_retained() {
        let channel = ErrorChannel::default();
        channel.report_unhandled(ReactiveError::TrackerMismatch);
        assert_eq!(channel.take_unhandled().len(), 1);
        assert!(channel.take_unhandled().is_empty());
    }

    #[test]
    fn error_messages() {
        let err = ReactiveError::evaluation("a.b", "boom");
        assert_eq!(err.to_string(), "evaluation of `a.b` failed: boom");
        let err = ReactiveError::NullTarget {
            key: "x".into(),
            target: "undefined",
        };
        assert_eq!(err.to_string(), "cannot access property `x` of undefined");
    }
}
