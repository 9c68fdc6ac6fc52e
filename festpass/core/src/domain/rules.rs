// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Selection Rule Engine
//!
//! Pure admission rules for event selections. Every function here is
//! synchronous and side-effect free; the registration service runs them
//! before a record may leave `Draft`, and again on confirm as a defense
//! against partially-updated payloads.
//!
//! ## Rules
//!
//! 1. A registration selects one or two events.
//! 2. At most one exception event and at most one ordinary event, so a pair
//!    is always exactly one of each.
//! 3. Team sizes respect the catalog bounds; members need a name and a valid,
//!    team-unique email.
//! 4. The category caps also hold across a contact's prior registrations,
//!    and an event already held cannot be registered again.
//!
//! Every error carries a stable `reason_code()` for the transport layer.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::domain::catalog::EventCode;
use crate::domain::registration::ParticipantDraft;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
        .expect("email pattern compiles")
});

/// Syntactic email check shared by participant and contact validation.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no events selected")]
    Empty,

    #[error("at most 2 events may be selected, got {count}")]
    TooMany { count: usize },

    #[error("event '{event}' selected more than once")]
    Duplicate { event: EventCode },

    #[error("only one exception event allowed")]
    MultipleExceptionEvents,

    #[error("only one regular event allowed; pair it with an exception event instead")]
    MultipleRegularEvents,
}

impl SelectionError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            SelectionError::Empty => "selection_empty",
            SelectionError::TooMany { .. } => "selection_too_many",
            SelectionError::Duplicate { .. } => "selection_duplicate",
            SelectionError::MultipleExceptionEvents => "selection_multiple_exception",
            SelectionError::MultipleRegularEvents => "selection_multiple_regular",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParticipantError {
    #[error("exactly {required} participants required, got {actual}")]
    ExactCount { required: usize, actual: usize },

    #[error("at least {min} participants required, got {actual}")]
    TooFew { min: usize, actual: usize },

    #[error("at most {max} participants allowed, got {actual}")]
    TooMany { max: usize, actual: usize },

    #[error("participant {position} is missing a name")]
    MissingName { position: usize },

    #[error("participant {position} is missing an email")]
    MissingEmail { position: usize },

    #[error("invalid email address: '{email}'")]
    InvalidEmail { email: String },

    #[error("duplicate email within team: '{email}'")]
    DuplicateEmail { email: String },
}

impl ParticipantError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            ParticipantError::ExactCount { .. } => "participants_exact_count",
            ParticipantError::TooFew { .. } => "participants_too_few",
            ParticipantError::TooMany { .. } => "participants_too_many",
            ParticipantError::MissingName { .. } => "participant_missing_name",
            ParticipantError::MissingEmail { .. } => "participant_missing_email",
            ParticipantError::InvalidEmail { .. } => "participant_invalid_email",
            ParticipantError::DuplicateEmail { .. } => "participant_duplicate_email",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConflictError {
    #[error("already registered for '{event}'")]
    AlreadyRegistered { event: EventCode },

    #[error("an exception event is already held; '{event}' would be a second one")]
    ExceptionQuotaExhausted { event: EventCode },

    #[error("a regular event is already held; '{event}' would be a second one")]
    RegularQuotaExhausted { event: EventCode },
}

impl ConflictError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            ConflictError::AlreadyRegistered { .. } => "conflict_already_registered",
            ConflictError::ExceptionQuotaExhausted { .. } => "conflict_exception_quota",
            ConflictError::RegularQuotaExhausted { .. } => "conflict_regular_quota",
        }
    }
}

/// Validate an event selection in isolation.
///
/// Accepts iff the count is 1 or 2, no event repeats, and the selection holds
/// at most one exception and at most one ordinary event. A pair therefore has
/// to be exactly one of each.
pub fn validate_selection(events: &[EventCode]) -> Result<(), SelectionError> {
    match events.len() {
        0 => return Err(SelectionError::Empty),
        1 | 2 => {}
        count => return Err(SelectionError::TooMany { count }),
    }

    if events.len() == 2 && events[0] == events[1] {
        return Err(SelectionError::Duplicate { event: events[0] });
    }

    let exception = events.iter().filter(|e| e.is_exception()).count();
    let regular = events.len() - exception;

    if exception > 1 {
        return Err(SelectionError::MultipleExceptionEvents);
    }
    if regular > 1 {
        return Err(SelectionError::MultipleRegularEvents);
    }
    Ok(())
}

/// Validate a team roster against the catalog bounds for one event.
///
/// When `min == max` the error names the exact required count, so a quiz team
/// of one reads "exactly 2 participants required" rather than a range bound.
pub fn validate_participants(
    participants: &[ParticipantDraft],
    min: usize,
    max: usize,
) -> Result<(), ParticipantError> {
    let actual = participants.len();
    if actual < min || actual > max {
        if min == max {
            return Err(ParticipantError::ExactCount {
                required: min,
                actual,
            });
        }
        if actual < min {
            return Err(ParticipantError::TooFew { min, actual });
        }
        return Err(ParticipantError::TooMany { max, actual });
    }

    let mut seen = Vec::with_capacity(actual);
    for (i, p) in participants.iter().enumerate() {
        let position = i + 1;
        if p.name.trim().is_empty() {
            return Err(ParticipantError::MissingName { position });
        }
        if p.email.trim().is_empty() {
            return Err(ParticipantError::MissingEmail { position });
        }
        if !is_valid_email(&p.email) {
            return Err(ParticipantError::InvalidEmail {
                email: p.email.clone(),
            });
        }
        let folded = p.email.to_ascii_lowercase();
        if seen.contains(&folded) {
            return Err(ParticipantError::DuplicateEmail {
                email: p.email.clone(),
            });
        }
        seen.push(folded);
    }
    Ok(())
}

/// Re-apply the category caps across a contact's prior registrations.
///
/// `prior` is the union of events held by earlier registrations for the same
/// contact email; `new` has already passed [`validate_selection`].
pub fn check_cross_registration(
    prior: &[EventCode],
    new: &[EventCode],
) -> Result<(), ConflictError> {
    for event in new {
        if prior.contains(event) {
            return Err(ConflictError::AlreadyRegistered { event: *event });
        }
    }

    let prior_exception = prior.iter().filter(|e| e.is_exception()).count();
    let prior_regular = prior.len() - prior_exception;

    for event in new {
        if event.is_exception() {
            if prior_exception >= 1 {
                return Err(ConflictError::ExceptionQuotaExhausted { event: *event });
            }
        } else if prior_regular >= 1 {
            return Err(ConflictError::RegularQuotaExhausted { event: *event });
        }
    }
    Ok(())
}
