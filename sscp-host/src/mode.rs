//! Collapses the original's twin entry points (`Authenticate`/
//! `AuthenticateEx`, `Outputs`/`OutputsEx`, ...) — each pair differing only
//! by a `selftest` bool — into one internal function taking a single tagged
//! `Mode`, per spec.md §9 "Twin constructors".

/// `Live` draws real randomness and talks to the real port. `SelfTest`
/// substitutes the literal vectors from the protocol spec for randomness
/// and reader responses, and never opens the serial port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Live,
    SelfTest,
}

impl Mode {
    pub fn is_self_test(self) -> bool {
        matches!(self, Mode::SelfTest)
    }
}
