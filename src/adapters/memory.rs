//! Heap introspection adapter.
//!
//! On ESP-IDF, free heap comes from `esp_get_free_heap_size()` and a
//! reclamation pass logs the low-water mark.  On the host, `MemAvailable`
//! from `/proc/meminfo` stands in for free heap; there is nothing to
//! collect, so a pass only counts.

use log::debug;

use crate::app::ports::MemoryPort;

#[derive(Debug, Default)]
pub struct SystemMemory {
    passes: u64,
}

impl SystemMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }
}

impl MemoryPort for SystemMemory {
    #[cfg(feature = "espidf")]
    fn free_bytes(&self) -> Option<usize> {
        Some(unsafe { esp_idf_svc::sys::esp_get_free_heap_size() } as usize)
    }

    #[cfg(not(feature = "espidf"))]
    fn free_bytes(&self) -> Option<usize> {
        let text = std::fs::read_to_string("/proc/meminfo").ok()?;
        parse_mem_available(&text)
    }

    fn reclaim(&mut self) {
        self.passes += 1;
        #[cfg(feature = "espidf")]
        {
            let low = unsafe { esp_idf_svc::sys::esp_get_minimum_free_heap_size() };
            debug!("Memory: pass {}, min free heap {} B", self.passes, low);
        }
        #[cfg(not(feature = "espidf"))]
        debug!("Memory: pass {}, free {:?} B", self.passes, self.free_bytes());
    }
}

/// `MemAvailable` in bytes.
#[cfg(not(feature = "espidf"))]
fn parse_mem_available(meminfo: &str) -> Option<usize> {
    let line = meminfo.lines().find(|l| l.starts_with("MemAvailable:"))?;
    let kb: usize = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb * 1024)
}
