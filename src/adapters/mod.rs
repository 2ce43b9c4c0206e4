//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements    | Connects to                      |
//! |-------------|---------------|----------------------------------|
//! | `udp`       | NetPort       | std UDP sockets (events, status) |
//! | `link`      | LinkPort      | OS-managed network interface     |
//! | `wifi`      | LinkPort      | ESP-IDF WiFi station             |
//! | `stagekit`  | StageKitPort  | Log output (mock peripheral)     |
//! | `memory`    | MemoryPort    | ESP-IDF heap / `/proc/meminfo`   |
//! | `log_sink`  | EventSink     | Serial / stderr log output       |
//! | `time`      | (none)        | Monotonic clock                  |
//! | `device_id` | (none)        | MAC-derived identity             |

pub mod device_id;
pub mod link;
pub mod log_sink;
pub mod memory;
pub mod stagekit;
pub mod time;
pub mod udp;
pub mod wifi;
