pub mod mmap;

pub use mmap::SharedMmap;

use lazy_static::lazy_static;

/// Size of a PMD-level (2 MiB) mapping, the large translation unit the
/// kernel uses when a fault can be satisfied with an aligned huge mapping.
pub const PMD_SIZE: usize = 2 * 1024 * 1024;

lazy_static! {
    /// Small-page size of the running system.
    pub static ref PAGE_SIZE: usize =
        unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_a_power_of_two() {
        assert!(PAGE_SIZE.is_power_of_two());
    }

    #[test]
    fn pmd_size_is_a_multiple_of_the_page_size() {
        assert_eq!(PMD_SIZE % *PAGE_SIZE, 0);
    }
}
