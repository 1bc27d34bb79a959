//! Typed views of common Redfish enumerations.
//!
//! The getters read the payload's own JSON and never touch the network.
//! A missing property is `NotFound`. A value outside the known set maps to
//! the `Unknown` variant, since services add enum members over time.

use serde_json::Value;
use std::fmt;

use super::payload::Payload;
use crate::error::{RedfishError, Result};

/// `Status.Health` and `Status.HealthRollup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Health {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Health {
    const VARIANTS: &'static [(&'static str, Health)] = &[
        ("OK", Health::Ok),
        ("Warning", Health::Warning),
        ("Critical", Health::Critical),
    ];
}

/// `Status.State`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Enabled,
    Disabled,
    StandbyOffline,
    StandbySpare,
    InTest,
    Starting,
    Absent,
    UnavailableOffline,
    Deferring,
    Quiesced,
    Updating,
    Unknown,
}

impl State {
    const VARIANTS: &'static [(&'static str, State)] = &[
        ("Enabled", State::Enabled),
        ("Disabled", State::Disabled),
        ("StandbyOffline", State::StandbyOffline),
        ("StandbySpare", State::StandbySpare),
        ("InTest", State::InTest),
        ("Starting", State::Starting),
        ("Absent", State::Absent),
        ("UnavailableOffline", State::UnavailableOffline),
        ("Deferring", State::Deferring),
        ("Quiesced", State::Quiesced),
        ("Updating", State::Updating),
    ];
}

/// `ChassisType` of a Chassis resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChassisType {
    Rack,
    Blade,
    Enclosure,
    StandAlone,
    RackMount,
    Card,
    Cartridge,
    Row,
    Pod,
    Expansion,
    Sidecar,
    Zone,
    Sled,
    Shelf,
    Drawer,
    Module,
    Component,
    IpBasedDrive,
    RackGroup,
    StorageEnclosure,
    Other,
    Unknown,
}

impl ChassisType {
    const VARIANTS: &'static [(&'static str, ChassisType)] = &[
        ("Rack", ChassisType::Rack),
        ("Blade", ChassisType::Blade),
        ("Enclosure", ChassisType::Enclosure),
        ("StandAlone", ChassisType::StandAlone),
        ("RackMount", ChassisType::RackMount),
        ("Card", ChassisType::Card),
        ("Cartridge", ChassisType::Cartridge),
        ("Row", ChassisType::Row),
        ("Pod", ChassisType::Pod),
        ("Expansion", ChassisType::Expansion),
        ("Sidecar", ChassisType::Sidecar),
        ("Zone", ChassisType::Zone),
        ("Sled", ChassisType::Sled),
        ("Shelf", ChassisType::Shelf),
        ("Drawer", ChassisType::Drawer),
        ("Module", ChassisType::Module),
        ("Component", ChassisType::Component),
        ("IPBasedDrive", ChassisType::IpBasedDrive),
        ("RackGroup", ChassisType::RackGroup),
        ("StorageEnclosure", ChassisType::StorageEnclosure),
        ("Other", ChassisType::Other),
    ];
}

/// `IndicatorLED` of a Chassis or ComputerSystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorLed {
    Lit,
    Blinking,
    Off,
    Unknown,
}

impl IndicatorLed {
    const VARIANTS: &'static [(&'static str, IndicatorLed)] = &[
        ("Lit", IndicatorLed::Lit),
        ("Blinking", IndicatorLed::Blinking),
        ("Off", IndicatorLed::Off),
    ];
}

macro_rules! redfish_enum {
    ($name:ident) => {
        impl $name {
            /// Case-insensitive match against the Redfish spelling.
            pub fn from_redfish(value: &str) -> Self {
                Self::VARIANTS
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(value))
                    .map(|(_, variant)| *variant)
                    .unwrap_or($name::Unknown)
            }

            /// The Redfish spelling; `None` for `Unknown`.
            pub fn as_redfish(self) -> Option<&'static str> {
                Self::VARIANTS
                    .iter()
                    .find(|(_, variant)| *variant == self)
                    .map(|(name, _)| *name)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_redfish().unwrap_or("Unknown"))
            }
        }
    };
}

redfish_enum!(Health);
redfish_enum!(State);
redfish_enum!(ChassisType);
redfish_enum!(IndicatorLed);

/// Text at `path` (JSON pointer) of the payload. Non-string values read as
/// unknown.
fn enum_text<'a>(payload: &'a Payload, path: &str) -> Result<Option<&'a str>> {
    let value = payload
        .json()
        .pointer(path)
        .ok_or_else(|| RedfishError::NotFound(format!("property {}", path)))?;
    Ok(match value {
        Value::String(text) => Some(text.as_str()),
        _ => None,
    })
}

fn read<T: Copy>(payload: &Payload, path: &str, parse: fn(&str) -> T, unknown: T) -> Result<T> {
    Ok(enum_text(payload, path)?.map_or(unknown, parse))
}

impl Payload {
    pub fn health(&self) -> Result<Health> {
        read(self, "/Status/Health", Health::from_redfish, Health::Unknown)
    }

    pub fn rollup_health(&self) -> Result<Health> {
        read(self, "/Status/HealthRollup", Health::from_redfish, Health::Unknown)
    }

    pub fn state(&self) -> Result<State> {
        read(self, "/Status/State", State::from_redfish, State::Unknown)
    }

    pub fn chassis_type(&self) -> Result<ChassisType> {
        read(self, "/ChassisType", ChassisType::from_redfish, ChassisType::Unknown)
    }

    pub fn indicator_led(&self) -> Result<IndicatorLed> {
        read(self, "/IndicatorLED", IndicatorLed::from_redfish, IndicatorLed::Unknown)
    }

    /// PATCHes `IndicatorLED` on the origin and returns the updated resource.
    pub async fn set_indicator_led(&self, led: IndicatorLed) -> Result<Payload> {
        let value = led.as_redfish().ok_or_else(|| {
            RedfishError::TypeError("IndicatorLED cannot be set to Unknown".to_string())
        })?;
        self.patch_string_property("IndicatorLED", value).await
    }
}
