use std::fmt;

/// Callback invoked with a human-readable message on every connect or query failure.
pub type ErrorHandler = Box<dyn FnMut(&str) + Send>;

/// Funnels fatal conditions to the configured handler, or to the tracing log by default.
#[derive(Default)]
pub struct ErrorReporter {
    handler: Option<ErrorHandler>,
}

impl ErrorReporter {
    pub fn set_handler(&mut self, handler: ErrorHandler) {
        self.handler = Some(handler);
    }

    pub fn clear_handler(&mut self) {
        self.handler = None;
    }

    pub fn report(&mut self, message: &str) {
        match self.handler.as_mut() {
            Some(handler) => handler(message),
            None => tracing::error!("{message}"),
        }
    }
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("custom_handler", &self.handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn custom_handler_receives_messages() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut reporter = ErrorReporter::default();
        reporter.set_handler(Box::new(move |msg| {
            sink.lock().expect("sink lock").push(msg.to_string());
        }));
        reporter.report("boom");
        assert_eq!(*seen.lock().expect("sink lock"), vec!["boom".to_string()]);

        reporter.clear_handler();
        reporter.report("to the log");
        assert_eq!(seen.lock().expect("sink lock").len(), 1);
    }
}
