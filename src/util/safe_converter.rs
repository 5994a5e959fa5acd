
/// For widening casts that can not lose information on the platforms we support
pub trait SafeCast<T> {
    fn safe_cast(self) -> T;
}

#[cfg(not(target_pointer_width = "16"))]
impl SafeCast<usize> for u32 {
    fn safe_cast(self) -> usize {
        self as usize
    }
}

impl SafeCast<usize> for u16 {
    fn safe_cast(self) -> usize {
        self as usize
    }
}


/// For narrowing casts where codec logic ensures that the value is in the narrower type's range.
/// NB: The implementations will panic otherwise
pub trait PrecheckedCast<T> {
    fn prechecked_cast(self) -> T;
}
impl PrecheckedCast<u8> for usize {
    fn prechecked_cast(self) -> u8 {
        self.try_into().expect("this is a bug: codec logic should have ensured the value range")
    }
}
impl PrecheckedCast<u16> for usize {
    fn prechecked_cast(self) -> u16 {
        self.try_into().expect("this is a bug: codec logic should have ensured the value range")
    }
}
impl PrecheckedCast<u32> for usize {
    fn prechecked_cast(self) -> u32 {
        self.try_into().expect("this is a bug: codec logic should have ensured the value range")
    }
}
impl PrecheckedCast<u8> for u32 {
    fn prechecked_cast(self) -> u8 {
        self.try_into().expect("this is a bug: codec logic should have ensured the value range")
    }
}
impl PrecheckedCast<u8> for u16 {
    fn prechecked_cast(self) -> u8 {
        self.try_into().expect("this is a bug: codec logic should have ensured the value range")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prechecked_in_range() {
        let v: u8 = 255usize.prechecked_cast();
        assert_eq!(v, 255);
        let v: u16 = 268usize.prechecked_cast();
        assert_eq!(v, 268);
        let v: u8 = 12u16.prechecked_cast();
        assert_eq!(v, 12);
    }

    #[test]
    #[should_panic]
    fn test_prechecked_out_of_range() {
        let _: u8 = 256usize.prechecked_cast();
    }
}
