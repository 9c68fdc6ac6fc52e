// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Event Catalog
//!
//! The static table of festival events a participant can register for.
//! Event identity is a closed enum: every catalog entry is an [`EventCode`]
//! variant, and free-form user input is resolved through
//! [`EventCode::resolve`], which either yields a variant or a typed
//! [`UnknownEventError`]. There is no fall-through to the raw string.
//!
//! | Concept | Type |
//! |---------|------|
//! | Catalog entry | [`EventDefinition`] |
//! | Event identity | [`EventCode`] |
//! | Solo vs. team | [`EventCategory`] |
//!
//! An *exception event* may be paired with exactly one ordinary event in a
//! single registration; two exception events can never be combined. The flag
//! lives on the definition so the rule engine (`domain::rules`) stays free of
//! per-event knowledge.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed identity of a catalog event.
///
/// Serialized by slug (e.g. `"group-dance"`) so stored registrations remain
/// readable and stable across display-label changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventCode {
    SoloSinging,
    SoloDance,
    Painting,
    StandUpComedy,
    Quiz,
    Debate,
    GroupSinging,
    GroupDance,
    StreetPlay,
    Cricket,
    Volleyball,
}

/// Whether an event is performed individually or as a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Solo,
    Group,
}

/// One row of the static event table.
#[derive(Debug, Clone)]
pub struct EventDefinition {
    pub code: EventCode,
    /// Display label rendered on credentials and status views.
    pub label: &'static str,
    pub category: EventCategory,
    pub min_participants: usize,
    pub max_participants: usize,
    /// Exception events may be paired with exactly one ordinary event.
    pub is_exception: bool,
    /// Accepted spellings beyond the label and slug, already folded.
    aliases: &'static [&'static str],
}

#[derive(Debug, Error)]
#[error("unknown event: '{input}'")]
pub struct UnknownEventError {
    pub input: String,
}

static CATALOG: &[EventDefinition] = &[
    EventDefinition {
        code: EventCode::SoloSinging,
        label: "Solo Singing",
        category: EventCategory::Solo,
        min_participants: 1,
        max_participants: 1,
        is_exception: false,
        aliases: &["singing", "solosong", "vocalsolo"],
    },
    EventDefinition {
        code: EventCode::SoloDance,
        label: "Solo Dance",
        category: EventCategory::Solo,
        min_participants: 1,
        max_participants: 1,
        is_exception: false,
        aliases: &["dancesolo"],
    },
    EventDefinition {
        code: EventCode::Painting,
        label: "Painting",
        category: EventCategory::Solo,
        min_participants: 1,
        max_participants: 1,
        is_exception: false,
        aliases: &["art", "canvaspainting"],
    },
    EventDefinition {
        code: EventCode::StandUpComedy,
        label: "Stand-Up Comedy",
        category: EventCategory::Solo,
        min_participants: 1,
        max_participants: 1,
        is_exception: false,
        aliases: &["standup", "comedy"],
    },
    EventDefinition {
        code: EventCode::Quiz,
        label: "Quiz",
        category: EventCategory::Group,
        min_participants: 2,
        max_participants: 2,
        is_exception: false,
        aliases: &["quizzing"],
    },
    EventDefinition {
        code: EventCode::Debate,
        label: "Debate",
        category: EventCategory::Group,
        min_participants: 2,
        max_participants: 2,
        is_exception: false,
        aliases: &["parliamentarydebate"],
    },
    EventDefinition {
        code: EventCode::GroupSinging,
        label: "Group Singing",
        category: EventCategory::Group,
        min_participants: 3,
        max_participants: 6,
        is_exception: false,
        aliases: &["choir", "groupsong"],
    },
    EventDefinition {
        code: EventCode::GroupDance,
        label: "Group Dance",
        category: EventCategory::Group,
        min_participants: 4,
        max_participants: 10,
        is_exception: true,
        aliases: &["dancegroup"],
    },
    EventDefinition {
        code: EventCode::StreetPlay,
        label: "Street Play",
        category: EventCategory::Group,
        min_participants: 6,
        max_participants: 12,
        is_exception: true,
        aliases: &["nukkad", "nukkadnatak"],
    },
    EventDefinition {
        code: EventCode::Cricket,
        label: "Cricket",
        category: EventCategory::Group,
        min_participants: 11,
        max_participants: 15,
        is_exception: true,
        aliases: &["cricketteam"],
    },
    EventDefinition {
        code: EventCode::Volleyball,
        label: "Volleyball",
        category: EventCategory::Group,
        min_participants: 6,
        max_participants: 9,
        is_exception: true,
        aliases: &["volley"],
    },
];

/// Fold user input to the comparison form: lowercase alphanumerics only.
fn fold(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl EventCode {
    /// All catalog events in display order.
    pub fn all() -> impl Iterator<Item = EventCode> {
        CATALOG.iter().map(|d| d.code)
    }

    /// Resolve free-form input to a catalog event.
    ///
    /// Matching is case-insensitive and ignores whitespace and punctuation,
    /// so `"group dance"`, `"Group-Dance"` and `"GROUPDANCE"` all resolve to
    /// [`EventCode::GroupDance`]. Fails closed: anything that does not match
    /// a label, slug, or registered alias is an [`UnknownEventError`].
    pub fn resolve(raw: &str) -> Result<EventCode, UnknownEventError> {
        let folded = fold(raw);
        if folded.is_empty() {
            return Err(UnknownEventError {
                input: raw.to_string(),
            });
        }
        for def in CATALOG {
            if fold(def.label) == folded || fold(def.slug()) == folded {
                return Ok(def.code);
            }
            if def.aliases.iter().any(|a| *a == folded) {
                return Ok(def.code);
            }
        }
        Err(UnknownEventError {
            input: raw.to_string(),
        })
    }

    /// The static definition backing this code.
    pub fn definition(self) -> &'static EventDefinition {
        CATALOG
            .iter()
            .find(|d| d.code == self)
            .expect("every EventCode variant has a catalog row")
    }

    pub fn label(self) -> &'static str {
        self.definition().label
    }

    pub fn is_exception(self) -> bool {
        self.definition().is_exception
    }
}

impl EventDefinition {
    /// Stable kebab-case identifier, identical to the serde representation.
    pub fn slug(&self) -> &'static str {
        match self.code {
            EventCode::SoloSinging => "solo-singing",
            EventCode::SoloDance => "solo-dance",
            EventCode::Painting => "painting",
            EventCode::StandUpComedy => "stand-up-comedy",
            EventCode::Quiz => "quiz",
            EventCode::Debate => "debate",
            EventCode::GroupSinging => "group-singing",
            EventCode::GroupDance => "group-dance",
            EventCode::StreetPlay => "street-play",
            EventCode::Cricket => "cricket",
            EventCode::Volleyball => "volleyball",
        }
    }
}

impl std::fmt::Display for EventCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_case_insensitive() {
        assert_eq!(EventCode::resolve("cricket").unwrap(), EventCode::Cricket);
        assert_eq!(EventCode::resolve("CRICKET").unwrap(), EventCode::Cricket);
        assert_eq!(EventCode::resolve("CriCkeT").unwrap(), EventCode::Cricket);
    }

    #[test]
    fn resolve_ignores_whitespace_and_punctuation() {
        assert_eq!(
            EventCode::resolve("Group Dance").unwrap(),
            EventCode::GroupDance
        );
        assert_eq!(
            EventCode::resolve("group-dance").unwrap(),
            EventCode::GroupDance
        );
        assert_eq!(
            EventCode::resolve(" stand up comedy ").unwrap(),
            EventCode::StandUpComedy
        );
    }

    #[test]
    fn resolve_accepts_aliases() {
        assert_eq!(EventCode::resolve("nukkad").unwrap(), EventCode::StreetPlay);
        assert_eq!(EventCode::resolve("choir").unwrap(), EventCode::GroupSinging);
        assert_eq!(EventCode::resolve("standup").unwrap(), EventCode::StandUpComedy);
    }

    #[test]
    fn resolve_fails_closed_on_unknown_input() {
        let err = EventCode::resolve("underwater basket weaving").unwrap_err();
        assert!(err.to_string().contains("underwater basket weaving"));
        assert!(EventCode::resolve("").is_err());
        assert!(EventCode::resolve("   ").is_err());
    }

    #[test]
    fn every_variant_has_a_catalog_row() {
        for code in EventCode::all() {
            let def = code.definition();
            assert_eq!(def.code, code);
            assert!(def.min_participants >= 1);
            assert!(def.min_participants <= def.max_participants);
        }
    }

    #[test]
    fn solo_events_take_exactly_one_participant() {
        for code in EventCode::all() {
            let def = code.definition();
            if def.category == EventCategory::Solo {
                assert_eq!(def.min_participants, 1);
                assert_eq!(def.max_participants, 1);
            }
        }
    }

    #[test]
    fn slug_round_trips_through_serde() {
        for code in EventCode::all() {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.definition().slug()));
            let back: EventCode = serde_json::from_str(&json).unwrap();
            assert_eq!(back, code);
        }
    }
}
