//! The schema binding layer for one deployment: device IDs, the 11-bit
//! CAN-ID formula, the common status property, and this deployment's
//! domain properties.
//!
//! This is the Rust analogue of a reference weather-station device
//! definition. Wind speed, wind direction, and rainfall are included
//! alongside the ambient reading since they exercise 12-bit fields at bit
//! offsets 0, 12, and 24 — fields that don't start or end on a byte
//! boundary, unlike the single-byte and double-byte ambient fields.

use crate::error::ConfigError;
use crate::field::{Field, FieldInput};
use crate::property::{ExtendedStructProperty, PropertyImpl};
use crate::registry::{PropertyRegistry, RegistryBuilder};
use crate::transport::{Receiver, Transmitter};

/// Device ID namespace: 0x0..0xE for devices, 0xF reserved for status.
pub const DEVICE_WEATHERSTATION: u8 = 0x0;
pub const DEVICE_STATUS: u8 = 0xF;

/// Incremented on any breaking schema change; compared modulo 256 by
/// receivers. A mismatch is surfaced to the application as a plain field
/// value rather than causing the frame itself to be dropped — there's no
/// reliable way to tell a stale sender from a newer one from the version
/// number alone, so this layer decodes and exposes it unconditionally and
/// leaves the decision to the caller.
pub const PROTOCOL_VERSION: u8 = 0;

pub const TRANSMIT_INTERVAL_MS: u32 = 2_000;
pub const DATA_TIMEOUT_MS: u32 = 10_000;

pub const RESET_REASONS: &[(&str, i64)] = &[
    ("POWER_ON", 0),
    ("BROWNOUT", 1),
    ("SOFTWARE", 2),
    ("DEEP_SLEEP_ALARM", 3),
    ("RESET_PIN", 4),
    ("WATCHDOG", 5),
    ("RESCUE_DEBUG", 6),
    ("UNKNOWN", 7),
];

/// `id = 0x700 | ((device_id & 0xF) << 4) | (field_id & 0xF)`. The high
/// three bits are always ones, giving status messages (field id on device
/// 0xF) the lowest arbitration priority of the reserved subrange.
pub const fn sid(device_id: u8, field_id: u8) -> u16 {
    0x0700 | (((device_id & 0xF) as u16) << 4) | ((field_id & 0xF) as u16)
}

fn status_fields() -> Vec<Field> {
    vec![
        Field::bool("release_build"),
        Field::bool("is_first_message"),
        Field::enum_field("reset_reason", 3, RESET_REASONS),
        Field::reserved(3),
        Field::int("proto_version", 8, 0.0, 1.0, false),
    ]
}

fn ambient_fields() -> Vec<Field> {
    vec![
        Field::int("temperature", 16, -200.0, 0.01, false), // -200C .. 455.35C
        Field::int("humidity", 8, 0.0, 100.0 / 255.0, false), // 0..100%
        Field::int("pressure", 16, 800.0, 0.01, false),      // 800hPa .. 1455.35hPa
    ]
}

fn windspeed_fields() -> Vec<Field> {
    vec![
        Field::int("10min", 12, 0.0, 0.1, false), // 0..409.6 km/hr
        Field::int("gust", 12, 0.0, 0.1, false),
        Field::int("instant", 12, 0.0, 0.1, false),
    ]
}

fn winddir_fields() -> Vec<Field> {
    let scale = 360.0 / 4096.0;
    vec![
        Field::int("10min", 12, 0.0, scale, false), // 0..360 deg
        Field::int("gust", 12, 0.0, scale, false),
        Field::int("instant", 12, 0.0, scale, false),
    ]
}

fn rain_fields() -> Vec<Field> {
    vec![
        Field::int("10min", 12, 0.0, 0.1, false), // 0..409.6mm
        Field::int("hourly", 12, 0.0, 0.1, false),
        Field::int("boot", 4, 0.0, 0.1, false), // 0..1.6mm
    ]
}

fn extended(fields: Vec<Field>) -> Result<PropertyImpl, ConfigError> {
    ExtendedStructProperty::new(fields)
        .map(PropertyImpl::ExtendedStruct)
        .map_err(|_| ConfigError::InvalidProperty)
}

/// A `PropertyRegistry` pre-loaded with the weather-station schema:
/// one status property plus the four ambient/windspeed/winddir/rain
/// domain properties.
pub struct WeatherStationRegistry {
    pub registry: PropertyRegistry,
    /// True until the first `assign_status` call made through this
    /// instance. This tracks cold-boot, not soft-reset: only a fresh
    /// process constructing a fresh `WeatherStationRegistry` resets it,
    /// not a device-side reset that merely re-sends the status property.
    first_message: bool,
}

impl WeatherStationRegistry {
    pub fn builder() -> RegistryBuilder {
        let mut builder = RegistryBuilder::new();
        builder.data_timeout_ms(DATA_TIMEOUT_MS);
        builder
    }

    /// Wraps an already-configured registry and installs the schema's
    /// properties. Fails only if the schema itself is malformed (it isn't,
    /// short of a programming error — the `Result` exists because
    /// `add_property` is fallible, not because callers are expected to
    /// hit it).
    pub fn new(mut registry: PropertyRegistry) -> Result<Self, ConfigError> {
        registry.add_property(
            sid(DEVICE_STATUS, DEVICE_WEATHERSTATION),
            "weatherstation_status",
            extended(status_fields())?,
        )?;
        registry.add_property(
            sid(DEVICE_WEATHERSTATION, 0),
            "weatherstation_ambient",
            extended(ambient_fields())?,
        )?;
        registry.add_property(
            sid(DEVICE_WEATHERSTATION, 1),
            "weatherstation_windspeed",
            extended(windspeed_fields())?,
        )?;
        registry.add_property(
            sid(DEVICE_WEATHERSTATION, 2),
            "weatherstation_winddir",
            extended(winddir_fields())?,
        )?;
        registry.add_property(
            sid(DEVICE_WEATHERSTATION, 3),
            "weatherstation_rain",
            extended(rain_fields())?,
        )?;

        Ok(WeatherStationRegistry {
            registry,
            first_message: true,
        })
    }

    pub fn with_transport(transmitter: Option<impl Transmitter + 'static>, receiver: Option<impl Receiver + 'static>) -> Result<Self, ConfigError> {
        let mut builder = Self::builder();
        if let Some(t) = transmitter {
            builder.transmitter(t);
        }
        if let Some(r) = receiver {
            builder.receiver(r);
        }
        Self::new(builder.build())
    }

    /// Assigns the status property. `is_first_message` is true for exactly
    /// the first call made through this instance's lifetime.
    pub fn assign_status(&mut self, release_build: bool, reset_reason: &str) -> Result<(), crate::error::PropertyError> {
        let fields = [
            ("release_build", FieldInput::Bool(release_build)),
            ("is_first_message", FieldInput::Bool(self.first_message)),
            ("reset_reason", FieldInput::Label(reset_reason)),
            ("proto_version", FieldInput::Number((PROTOCOL_VERSION % 8) as f64)),
        ];
        self.registry
            .set("weatherstation_status", crate::property::PropertyInput::Fields(fields.to_vec()))?;
        self.first_message = false;
        Ok(())
    }

    pub fn event_loop(&mut self) {
        self.registry.event_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_rejects_a_field_list_with_duplicate_names() {
        let bad_fields = vec![Field::bool("dup"), Field::bool("dup")];
        assert_eq!(extended(bad_fields).unwrap_err(), ConfigError::InvalidProperty);
    }

    #[test]
    fn sid_formula_matches_reference() {
        assert_eq!(sid(DEVICE_WEATHERSTATION, 0), 0x700);
        assert_eq!(sid(DEVICE_STATUS, DEVICE_WEATHERSTATION), 0x7F0);
    }

    #[test]
    fn registry_declares_all_five_properties_in_order() {
        let registry = WeatherStationRegistry::new(WeatherStationRegistry::builder().build()).unwrap();
        assert_eq!(
            registry.registry.iter_names().collect::<Vec<_>>(),
            vec![
                "weatherstation_status",
                "weatherstation_ambient",
                "weatherstation_windspeed",
                "weatherstation_winddir",
                "weatherstation_rain",
            ]
        );
    }

    #[test]
    fn first_message_flag_is_true_once_then_false() {
        let mut ws = WeatherStationRegistry::new(WeatherStationRegistry::builder().build()).unwrap();
        ws.assign_status(false, "POWER_ON").unwrap();
        let handle = ws.registry.handle_mut("weatherstation_status").unwrap();
        assert_eq!(handle.get("is_first_message").unwrap().as_bool(), Some(true));
        drop(handle);

        ws.assign_status(false, "POWER_ON").unwrap();
        let handle = ws.registry.handle_mut("weatherstation_status").unwrap();
        assert_eq!(handle.get("is_first_message").unwrap().as_bool(), Some(false));
    }
}
