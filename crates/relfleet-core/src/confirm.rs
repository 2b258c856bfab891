//! Confirmation capability for destructive operations.
//!
//! The decision of *whether* an operation warrants confirmation lives with
//! the operation ([`crate::ops::FleetOp::severity`]); this module only
//! supplies the mechanism, injected as a trait object so workflows stay
//! testable without simulating a terminal.

use std::io::{self, BufRead, Write};

/// Asks the operator to confirm a warning. `severity` is how many
/// consecutive affirmations are required; higher for more destructive
/// operations.
pub trait Confirmer {
    fn confirm(&self, warning: &str, severity: u8) -> bool;
}

/// Interactive confirmer reading yes/no answers from stdin.
pub struct StdinConfirmer;

impl Confirmer for StdinConfirmer {
    fn confirm(&self, warning: &str, severity: u8) -> bool {
        println!("{warning}");
        let stdin = io::stdin();
        for round in 0..severity.max(1) {
            if round == 0 {
                print!("Do you want to continue? [y/N] ");
            } else {
                print!("Are you sure? [y/N] ");
            }
            let _ = io::stdout().flush();
            let mut answer = String::new();
            if stdin.lock().read_line(&mut answer).is_err() {
                return false;
            }
            if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
                return false;
            }
        }
        true
    }
}

/// Answers every prompt with yes. Backs `--yes` and tests.
pub struct AutoConfirmer;

impl Confirmer for AutoConfirmer {
    fn confirm(&self, _warning: &str, _severity: u8) -> bool {
        true
    }
}

/// Refuses every prompt. Test double for abort paths.
pub struct DenyConfirmer;

impl Confirmer for DenyConfirmer {
    fn confirm(&self, _warning: &str, _severity: u8) -> bool {
        false
    }
}
