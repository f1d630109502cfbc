use chrono::Duration;
use tracing::debug;

use super::Session;
use crate::config::DividerConfig;
use crate::error::ConfigError;
use crate::event::RawEvent;

/// Single left-to-right pass over time-ordered events.
///
/// A new session starts when none is open, when the gap since the previous
/// event exceeds the timeout, or (if enabled) when the application changes
/// between two events that both name one. Sessions below `min_events` are
/// dropped, never merged into a neighbour.
#[derive(Debug, Clone)]
pub struct SessionDivider {
    config: DividerConfig,
    timeout: Duration,
}

impl SessionDivider {
    pub fn new(config: DividerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let timeout = Duration::from_std(config.timeout())
            .map_err(|e| ConfigError::bound("divider.timeout_secs", e.to_string()))?;
        Ok(Self { config, timeout })
    }

    pub fn config(&self) -> &DividerConfig {
        &self.config
    }

    pub fn divide<I>(&self, events: I) -> Vec<Session>
    where
        I: IntoIterator<Item = RawEvent>,
    {
        let mut sessions = Vec::new();
        let mut current: Option<Session> = None;
        let mut dropped = 0usize;

        for event in events {
            let boundary = match &current {
                None => true,
                Some(open) => self.is_boundary(open, &event),
            };

            if boundary {
                if let Some(closed) = current.take() {
                    self.emit(closed, &mut sessions, &mut dropped);
                }
                current = Some(Session::open(event));
            } else if let Some(open) = current.as_mut() {
                open.push(event);
            }
        }

        if let Some(closed) = current.take() {
            self.emit(closed, &mut sessions, &mut dropped);
        }

        debug!(sessions = sessions.len(), dropped, "divided event stream");
        sessions
    }

    fn is_boundary(&self, open: &Session, event: &RawEvent) -> bool {
        let Some(previous) = open.events.last() else {
            return true;
        };

        if event.timestamp - previous.timestamp > self.timeout {
            return true;
        }

        if self.config.split_on_app_change {
            if let (Some(prev_app), Some(app)) = (previous.application(), event.application()) {
                return prev_app != app;
            }
        }

        false
    }

    fn emit(&self, session: Session, out: &mut Vec<Session>, dropped: &mut usize) {
        if session.event_count >= self.config.min_events {
            out.push(session);
        } else {
            *dropped += 1;
        }
    }
}
