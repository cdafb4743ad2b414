pub mod bytes;
pub mod escape;
pub mod fs_util;
pub mod log;
pub mod process;
#[cfg(test)]
pub(crate) mod test_util;
