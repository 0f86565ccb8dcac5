//! Mock MMIO device for bus contract tests.

use mockall::mock;

use memsim_core::common::MemResult;
use memsim_core::soc::devices::{Device, DeviceCaps};

mock! {
    /// Scriptable MMIO endpoint.
    pub MmioDevice {}

    impl Device for MmioDevice {
        fn name(&self) -> &str;
        fn region(&self) -> (u64, u64);
        fn caps(&self) -> DeviceCaps;
        fn read(&mut self, offset: u64, count: usize) -> MemResult<Vec<u8>>;
        fn write(&mut self, offset: u64, data: &[u8]) -> MemResult<()>;
    }
}
