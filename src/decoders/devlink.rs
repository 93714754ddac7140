//! Devlink health-report decoder, ported from
//! `original_source/ras-devlink-handler.c`. The original's
//! `ras_net_xmit_timeout_handler` and `ras_devlink_event_handler` both feed
//! the same `devlink_event` record; [`decode_xmit_timeout`] synthesizes the
//! message the former builds on the fly (`"TX timeout on queue: N"`) with
//! empty `bus_name`/`reporter_name`, matching the original.

use crate::records::DevlinkHealthReport;

pub struct RawDevlinkEvent {
    pub bus_name: String,
    pub dev_name: String,
    pub driver_name: String,
    pub reporter_name: String,
    pub message: String,
}

pub fn decode(event: RawDevlinkEvent, timestamp: String) -> DevlinkHealthReport {
    DevlinkHealthReport {
        timestamp,
        bus_name: event.bus_name,
        dev_name: event.dev_name,
        driver_name: event.driver_name,
        reporter_name: event.reporter_name,
        message: event.message,
    }
}

pub fn decode_xmit_timeout(dev_name: String, driver_name: String, queue_index: u32, timestamp: String) -> DevlinkHealthReport {
    decode(
        RawDevlinkEvent {
            bus_name: String::new(),
            dev_name,
            driver_name,
            reporter_name: String::new(),
            message: format!("TX timeout on queue: {queue_index}"),
        },
        timestamp,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xmit_timeout_formats_queue_index() {
        let record = decode_xmit_timeout("eth0".to_string(), "mlx5_core".to_string(), 3, "now".to_string());
        assert_eq!(record.message, "TX timeout on queue: 3");
        assert!(record.bus_name.is_empty());
    }

    #[test]
    fn devlink_event_passes_fields_through() {
        let event = RawDevlinkEvent {
            bus_name: "pci".to_string(),
            dev_name: "0000:01:00.0".to_string(),
            driver_name: "mlx5_core".to_string(),
            reporter_name: "tx".to_string(),
            message: "tx error".to_string(),
        };
        let record = decode(event, "now".to_string());
        assert_eq!(record.bus_name, "pci");
        assert_eq!(record.reporter_name, "tx");
    }
}
