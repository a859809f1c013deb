use bitflags::bitflags;

bitflags! {
    /// Cache-side access intent for a resource acquisition (`getBuffer`, `getImage`,
    /// ...).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

bitflags! {
    /// Shader-side access recorded against a resolved `UniformInfo` entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessOp: u8 {
        const NONE = 0;
        const LOAD = 1 << 0;
        const STORE = 1 << 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_is_union() {
        assert_eq!(Access::READ_WRITE, Access::READ | Access::WRITE);
    }
}
