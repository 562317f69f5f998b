//! CLI exit codes. Scripts rely on these; treat changes as breaking.
//!
//! | Code | Meaning                                            |
//! |------|----------------------------------------------------|
//! | 0    | Success                                            |
//! | 1    | General error                                      |
//! | 2    | Usage error (bad arguments, unreadable input file) |
//! | 3    | Validation error (bad upload, rule or field)       |
//! | 4    | Not found (batch, rule or field)                   |
//! | 5    | Engine error (matching run, corrupt stored data)   |
//! | 6    | Export error                                       |
//! | 7    | Transient (store busy/locked, IO); retry may work  |
//! | 8    | `run --strict`: suspected or unmatched rows remain |
//! | 9    | Server could not start                             |

use crosslink_protocol::ErrorKind;

pub const EXIT_SUCCESS: u8 = 0;

/// Prefer a specific code.
pub const EXIT_ERROR: u8 = 1;

pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Boundary error kinds (3-7)
// =============================================================================

pub const EXIT_VALIDATION: u8 = 3;
pub const EXIT_NOT_FOUND: u8 = 4;
pub const EXIT_ENGINE: u8 = 5;
pub const EXIT_EXPORT: u8 = 6;
pub const EXIT_TRANSIENT: u8 = 7;

// =============================================================================
// Command-specific (8-9)
// =============================================================================

/// `run --strict` found rows that are not definitely matched.
pub const EXIT_RUN_UNRESOLVED: u8 = 8;

/// `serve` failed to bind its listen address.
pub const EXIT_SERVE_BIND: u8 = 9;

pub fn kind_exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Validation => EXIT_VALIDATION,
        ErrorKind::NotFound => EXIT_NOT_FOUND,
        ErrorKind::Engine => EXIT_ENGINE,
        ErrorKind::Export => EXIT_EXPORT,
        ErrorKind::Transient => EXIT_TRANSIENT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_have_distinct_codes() {
        let kinds = [
            ErrorKind::Validation,
            ErrorKind::NotFound,
            ErrorKind::Engine,
            ErrorKind::Export,
            ErrorKind::Transient,
        ];
        let mut codes: Vec<u8> = kinds.iter().map(|k| kind_exit_code(*k)).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
        assert!(!codes.contains(&EXIT_SUCCESS));
        assert!(!codes.contains(&EXIT_USAGE));
    }
}
