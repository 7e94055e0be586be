//! A property-replication bus for a constrained, frame-oriented network
//! shaped like classic CAN: 11-bit arbitration IDs, payloads of at most
//! eight bytes.
//!
//! A [`registry::PropertyRegistry`] owns a set of named
//! [`property::PropertyImpl`] values, each bound to a CAN ID. Local writes
//! go out on the next [`registry::PropertyRegistry::event_loop`] tick;
//! inbound frames update the matching property and start its expiry timer.
//! [`extended_struct::ExtendedStruct`] is the bit-packed codec most
//! properties are built from; [`schema`] binds a concrete set of them to a
//! weather station's CAN IDs.
//!
//! ```
//! use propbus::clock::ManualClock;
//! use propbus::schema::WeatherStationRegistry;
//! use propbus::property::PropertyInput;
//! use propbus::field::FieldInput;
//! use std::rc::Rc;
//!
//! let clock = Rc::new(ManualClock::new());
//! let mut builder = WeatherStationRegistry::builder();
//! builder.clock(clock);
//! let mut station = WeatherStationRegistry::new(builder.build()).unwrap();
//!
//! station.assign_status(true, "POWER_ON").unwrap();
//! station.registry.set(
//!     "weatherstation_ambient",
//!     PropertyInput::Fields(vec![
//!         ("temperature", FieldInput::Number(21.5)),
//!         ("humidity", FieldInput::Number(47.0)),
//!         ("pressure", FieldInput::Number(1013.0)),
//!     ]),
//! ).unwrap();
//! ```

pub mod bitbuf;
pub mod clock;
pub mod error;
pub mod extended_struct;
pub mod field;
pub mod frame;
pub mod property;
pub mod registry;
pub mod schema;
pub mod serial_tunnel;
pub mod status;
pub mod transport;

pub use error::{ConfigError, FieldError, PropertyError};
pub use field::{Field, FieldInput, FieldValue};
pub use frame::CanFrame;
pub use property::{Property, PropertyImpl, PropertyInput, PropertyValue};
pub use registry::{PropertyRegistry, RegistryBuilder, Warnings};
pub use status::PropertyStatus;
