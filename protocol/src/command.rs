//! Command values: a mode in the low byte plus option flags in the high bits

use std::fmt;

/// Mask selecting the mode portion of a command value
pub const MODE_MASK: u32 = 0x0000_00FF;

/// Message kind carried in the low byte of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mode(u8);

impl Mode {
    pub const NOOPERATION: Mode = Mode(0x00);

    /// Presence announcement (broadcast)
    pub const BR_ENTRY: Mode = Mode(0x01);
    /// Leaving the network (broadcast)
    pub const BR_EXIT: Mode = Mode(0x02);
    /// Reply to a presence announcement
    pub const ANSENTRY: Mode = Mode(0x03);
    /// Absence state change (broadcast)
    pub const BR_ABSENCE: Mode = Mode(0x04);

    pub const BR_ISGETLIST: Mode = Mode(0x10);
    pub const OKGETLIST: Mode = Mode(0x11);
    pub const GETLIST: Mode = Mode(0x12);
    pub const ANSLIST: Mode = Mode(0x13);
    pub const BR_ISGETLIST2: Mode = Mode(0x18);

    /// Message delivery
    pub const SENDMSG: Mode = Mode(0x20);
    /// Delivery confirmation, option carries the original sequence number
    pub const RECVMSG: Mode = Mode(0x21);
    pub const READMSG: Mode = Mode(0x30);
    pub const DELMSG: Mode = Mode(0x31);
    pub const ANSREADMSG: Mode = Mode(0x32);

    pub const GETINFO: Mode = Mode(0x40);
    pub const SENDINFO: Mode = Mode(0x41);
    pub const GETABSENCEINFO: Mode = Mode(0x50);
    pub const SENDABSENCEINFO: Mode = Mode(0x51);

    pub const GETFILEDATA: Mode = Mode(0x60);
    pub const RELEASEFILES: Mode = Mode(0x61);
    pub const GETDIRFILES: Mode = Mode(0x62);

    pub const GETPUBKEY: Mode = Mode(0x72);
    pub const ANSPUBKEY: Mode = Mode(0x73);

    pub const fn from_u8(value: u8) -> Self {
        Mode(value)
    }

    pub const fn to_u8(self) -> u8 {
        self.0
    }

    /// Modes whose option carries `nickname\0group\0`
    pub fn is_entry_family(self) -> bool {
        self == Mode::BR_ENTRY || self == Mode::ANSENTRY
    }

    /// Protocol name of a known mode
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Mode::NOOPERATION => "NOOPERATION",
            Mode::BR_ENTRY => "BR_ENTRY",
            Mode::BR_EXIT => "BR_EXIT",
            Mode::ANSENTRY => "ANSENTRY",
            Mode::BR_ABSENCE => "BR_ABSENCE",
            Mode::BR_ISGETLIST => "BR_ISGETLIST",
            Mode::OKGETLIST => "OKGETLIST",
            Mode::GETLIST => "GETLIST",
            Mode::ANSLIST => "ANSLIST",
            Mode::BR_ISGETLIST2 => "BR_ISGETLIST2",
            Mode::SENDMSG => "SENDMSG",
            Mode::RECVMSG => "RECVMSG",
            Mode::READMSG => "READMSG",
            Mode::DELMSG => "DELMSG",
            Mode::ANSREADMSG => "ANSREADMSG",
            Mode::GETINFO => "GETINFO",
            Mode::SENDINFO => "SENDINFO",
            Mode::GETABSENCEINFO => "GETABSENCEINFO",
            Mode::SENDABSENCEINFO => "SENDABSENCEINFO",
            Mode::GETFILEDATA => "GETFILEDATA",
            Mode::RELEASEFILES => "RELEASEFILES",
            Mode::GETDIRFILES => "GETDIRFILES",
            Mode::GETPUBKEY => "GETPUBKEY",
            Mode::ANSPUBKEY => "ANSPUBKEY",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#04x}", self.0),
        }
    }
}

/// Option bit carried above the mode byte
///
/// Some values are shared between the entry family and the message family
/// (`ABSENCE`/`SENDCHECK`, `SERVER`/`SECRET`); the bit test does not care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Flag(u32);

impl Flag {
    // Entry family
    pub const ABSENCE: Flag = Flag(0x0000_0100);
    pub const SERVER: Flag = Flag(0x0000_0200);
    pub const DIALUP: Flag = Flag(0x0001_0000);
    pub const FILEATTACH: Flag = Flag(0x0020_0000);
    pub const ENCRYPT: Flag = Flag(0x0040_0000);
    pub const UTF8: Flag = Flag(0x0080_0000);

    // Message family
    /// Sender wants a RECVMSG confirmation
    pub const SENDCHECK: Flag = Flag(0x0000_0100);
    pub const SECRET: Flag = Flag(0x0000_0200);
    pub const BROADCAST: Flag = Flag(0x0000_0400);
    pub const MULTICAST: Flag = Flag(0x0000_0800);
    pub const NOPOPUP: Flag = Flag(0x0000_1000);
    pub const AUTORET: Flag = Flag(0x0000_2000);
    pub const RETRY: Flag = Flag(0x0000_4000);
    pub const PASSWORD: Flag = Flag(0x0000_8000);
    pub const NOLOG: Flag = Flag(0x0002_0000);
    pub const NEWMULTI: Flag = Flag(0x0004_0000);
    pub const NOADDLIST: Flag = Flag(0x0008_0000);
    pub const READCHECK: Flag = Flag(0x0010_0000);

    pub const fn bits(self) -> u32 {
        self.0
    }
}

/// Packed command value as it travels on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Command(u32);

impl Command {
    pub const fn from_u32(value: u32) -> Self {
        Command(value)
    }

    pub const fn to_u32(self) -> u32 {
        self.0
    }

    pub const fn mode(self) -> Mode {
        Mode((self.0 & MODE_MASK) as u8)
    }

    pub const fn has(self, flag: Flag) -> bool {
        self.0 & flag.0 != 0
    }

    /// Copy of this command with `flag` set
    #[must_use]
    pub const fn with(self, flag: Flag) -> Self {
        Command(self.0 | flag.0)
    }
}

impl From<Mode> for Command {
    fn from(mode: Mode) -> Self {
        Command(mode.0 as u32)
    }
}

impl From<u32> for Command {
    fn from(value: u32) -> Self {
        Command(value)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
