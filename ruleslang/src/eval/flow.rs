//! Control-flow results of statement evaluation.

/// What a statement asks of its enclosing construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// Continue with the next statement.
    Proceed,
    /// Re-dispatch the same statement. Part of the flow vocabulary for
    /// drivers that re-enter a statement; nothing in this implementation
    /// produces it — the shell assembles a whole submission before
    /// evaluating — so the dispatch loops only pass it through.
    Rerun,
    /// Leave the innermost loop, or the labeled one.
    Break(Option<String>),
    /// Re-enter the innermost loop, or the labeled one.
    Continue(Option<String>),
    /// Unwind to the enclosing function call or to the rule driver.
    Return,
}

impl Flow {
    /// Whether a break/continue label addresses the loop with `label`.
    pub fn matches_loop(target: &Option<String>, label: &Option<String>) -> bool {
        match target {
            None => true,
            Some(target) => label.as_deref() == Some(target.as_str()),
        }
    }
}
