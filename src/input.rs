//! User input as consumed by the machine, one snapshot per tic.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LeftRightDir {
    #[default]
    Neutral,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpDownDir {
    #[default]
    Neutral,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ButtonState {
    #[default]
    Released,
    Pushed,
}

/// One frame's worth of input, applied to the well-known registers at the
/// top of each tic.
#[derive(Debug, Clone, Default)]
pub struct UserInput {
    pub horizontal: LeftRightDir,
    pub vertical: UpDownDir,
    pub action: ButtonState,
    /// Character typed since the previous tic, if any. Only observed by
    /// the password-entry part.
    pub last_char: Option<char>,
    /// The player asked for the password screen.
    pub request_password_screen: bool,
}
