//! Client-local review flow: `Scan → Details → Results`.
//!
//! Pure state machine driven only by server responses. An event that does
//! not fit the current state is rejected and the state is left as it was.

use thiserror::Error;

use crate::AnalysisView;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Flow {
    /// Waiting for a page to be captured.
    #[default]
    Scan,
    /// Screenshot in hand, waiting for context and an analysis.
    Details {
        url: String,
        screenshot_path: String,
        screenshot_url: String,
    },
    Results {
        url: Option<String>,
        view: AnalysisView,
    },
}

#[derive(Debug, Clone)]
pub enum Event {
    Scanned {
        url: String,
        screenshot_path: String,
        screenshot_url: String,
    },
    Analyzed(AnalysisView),
    /// Re-derived payload after a vote.
    Refreshed(AnalysisView),
}

impl Event {
    fn name(&self) -> &'static str {
        match self {
            Event::Scanned { .. } => "scanned",
            Event::Analyzed(_) => "analyzed",
            Event::Refreshed(_) => "refreshed",
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FlowError {
    #[error("cannot apply '{event}' while in {state}")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },

    #[error("refresh for analysis {got} does not match current analysis {expected}")]
    AnalysisMismatch { expected: String, got: String },
}

impl Flow {
    pub fn name(&self) -> &'static str {
        match self {
            Flow::Scan => "scan",
            Flow::Details { .. } => "details",
            Flow::Results { .. } => "results",
        }
    }

    /// Enter the results view of an analysis fetched from the server.
    pub fn resume(view: AnalysisView) -> Self {
        Flow::Results { url: None, view }
    }

    pub fn apply(&mut self, event: Event) -> Result<(), FlowError> {
        let next = match (&*self, event) {
            (
                Flow::Scan,
                Event::Scanned {
                    url,
                    screenshot_path,
                    screenshot_url,
                },
            ) => Flow::Details {
                url,
                screenshot_path,
                screenshot_url,
            },
            (Flow::Details { url, .. }, Event::Analyzed(view)) => Flow::Results {
                url: Some(url.clone()),
                view,
            },
            (Flow::Results { url, view: current }, Event::Refreshed(view)) => {
                if current.analysis_id != view.analysis_id {
                    return Err(FlowError::AnalysisMismatch {
                        expected: current.analysis_id.clone(),
                        got: view.analysis_id,
                    });
                }
                Flow::Results {
                    url: url.clone(),
                    view,
                }
            }
            (state, event) => {
                return Err(FlowError::InvalidTransition {
                    state: state.name(),
                    event: event.name(),
                })
            }
        };
        *self = next;
        Ok(())
    }

    pub fn view(&self) -> Option<&AnalysisView> {
        match self {
            Flow::Results { view, .. } => Some(view),
            _ => None,
        }
    }
}
