use modular_bitfield::{bitfield, specifiers::B5};

// Only `CMP` ever writes these; every bit not named here is reserved and
// always reads back as zero.
#[bitfield(bits = 8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub struct Flags {
    pub zero: bool,
    pub greater: bool,
    pub less: bool,
    #[skip]
    __reserved: B5,
}

impl Flags {
    /// Clears zero/greater/less and sets exactly the one that applies to
    /// an unsigned comparison of `a` against `b`.
    pub fn set_from_cmp(&mut self, a: u16, b: u16) {
        self.set_zero(a == b);
        self.set_greater(a > b);
        self.set_less(a < b);
    }
}
