/// A natural-language question submitted to the pipeline.
///
/// Queries are immutable and owned by the caller; the pipeline only borrows
/// them for the duration of one `answer` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    session_id: Option<String>,
}

impl Query {
    /// Creates a query without a conversation/session identifier.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session_id: None,
        }
    }

    /// Attaches a conversation/session identifier, used for log correlation.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Returns the raw question text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the session identifier, if any.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}
