//! Event types for terminal input.

/// A terminal event.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event {
    /// A key changed state.
    Key(KeyEvent),
    /// A printable codepoint was typed.
    Text {
        /// The typed codepoint.
        codepoint: char,
    },
    /// A mouse event occurred.
    Mouse(MouseEvent),
    /// Text was pasted (bracketed paste mode).
    Paste {
        /// Raw pasted bytes.
        bytes: Vec<u8>,
    },
    /// The terminal was resized.
    Resize {
        /// New column count.
        cols: u16,
        /// New row count.
        rows: u16,
    },
    /// A scheduler tick.
    Tick,
    /// An application-posted event.
    User {
        /// Application-defined tag.
        tag: u32,
        /// Application-defined payload.
        payload: Vec<u8>,
    },
}

/// Key transition direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum KeyAction {
    /// The key went down (or repeated).
    #[default]
    Down,
    /// The key was released.
    Up,
}

/// A keyboard event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    /// The key code.
    pub code: KeyCode,
    /// Active modifiers.
    pub modifiers: Modifiers,
    /// Down or up.
    pub action: KeyAction,
}

impl KeyEvent {
    /// Create a new key-down event.
    pub const fn new(code: KeyCode, modifiers: Modifiers) -> Self {
        Self {
            code,
            modifiers,
            action: KeyAction::Down,
        }
    }

    /// Create a plain key-down event with no modifiers.
    pub const fn plain(code: KeyCode) -> Self {
        Self::new(code, Modifiers::NONE)
    }

    /// Check if Ctrl is held.
    pub const fn ctrl(&self) -> bool {
        self.modifiers.contains(Modifiers::CTRL)
    }

    /// Check if Alt is held.
    pub const fn alt(&self) -> bool {
        self.modifiers.contains(Modifiers::ALT)
    }

    /// Check if Shift is held.
    pub const fn shift(&self) -> bool {
        self.modifiers.contains(Modifiers::SHIFT)
    }
}

/// A key code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum KeyCode {
    /// A character key.
    Char(char),
    /// Enter / Return.
    Enter,
    /// Tab.
    Tab,
    /// Backspace.
    Backspace,
    /// Delete.
    Delete,
    /// Escape.
    Escape,
    /// Arrow up.
    Up,
    /// Arrow down.
    Down,
    /// Arrow left.
    Left,
    /// Arrow right.
    Right,
    /// Home.
    Home,
    /// End.
    End,
    /// Page up.
    PageUp,
    /// Page down.
    PageDown,
    /// Insert.
    Insert,
    /// Function key (F1-F12).
    F(u8),
    /// The terminal gained focus.
    FocusIn,
    /// The terminal lost focus.
    FocusOut,
}

/// Keyboard modifier flags.
///
/// Bit layout: shift = bit 0, ctrl = bit 1, alt = bit 2, meta = bit 3.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Modifiers(u8);

impl Modifiers {
    /// No modifiers.
    pub const NONE: Self = Self(0);
    /// Shift modifier.
    pub const SHIFT: Self = Self(1 << 0);
    /// Ctrl modifier.
    pub const CTRL: Self = Self(1 << 1);
    /// Alt/Option modifier.
    pub const ALT: Self = Self(1 << 2);
    /// Meta/Super/Command modifier.
    pub const META: Self = Self(1 << 3);

    /// Check if this modifier set contains the given modifier.
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0 && other.0 != 0
    }

    /// Combine two modifier sets.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// The raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Construct from raw bits (extra bits are masked off).
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x0f)
    }

    /// Whether no modifier is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Modifiers {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// The kind of mouse event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum MouseKind {
    /// The pointer moved.
    Move,
    /// A button was pressed.
    Down,
    /// A button was released.
    Up,
    /// The wheel scrolled.
    Wheel,
}

/// A mouse event. Coordinates are zero-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MouseEvent {
    /// The kind of mouse event.
    pub kind: MouseKind,
    /// Column (0-based).
    pub x: i32,
    /// Row (0-based).
    pub y: i32,
    /// Button bits (bit 0 = left, 1 = middle, 2 = right).
    pub buttons: u8,
    /// Horizontal wheel delta.
    pub wheel_x: i32,
    /// Vertical wheel delta.
    pub wheel_y: i32,
    /// Active modifiers.
    pub modifiers: Modifiers,
}

impl MouseEvent {
    /// A button-down event at the given position.
    pub const fn down(x: i32, y: i32, buttons: u8) -> Self {
        Self {
            kind: MouseKind::Down,
            x,
            y,
            buttons,
            wheel_x: 0,
            wheel_y: 0,
            modifiers: Modifiers::NONE,
        }
    }

    /// A button-up event at the given position.
    pub const fn up(x: i32, y: i32, buttons: u8) -> Self {
        Self {
            kind: MouseKind::Up,
            x,
            y,
            buttons,
            wheel_x: 0,
            wheel_y: 0,
            modifiers: Modifiers::NONE,
        }
    }
}
