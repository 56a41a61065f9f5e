pub trait OpCode {
    fn op_code(&self) -> u8;
}

/// ROM level commands understood by every device on the wire
#[derive(Clone, Copy, Debug)]
#[repr(u8)]
pub enum Command {
    MatchRom = 0x55,
    SearchRom = 0xF0,
    SkipRom = 0xCC,
}

impl OpCode for Command {
    fn op_code(&self) -> u8 {
        *self as _
    }
}
