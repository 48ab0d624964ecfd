//! Cases, data sources and the correlation attribute types shared by every case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub type CaseId = i64;
pub type DataSourceId = i64;

/// A case record in the central repository.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CorrelationCase {
    pub id: CaseId,
    pub display_name: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DataSource {
    pub id: DataSourceId,
    pub case_id: CaseId,
    pub name: String,
    #[serde(default)]
    pub device_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DataSourceRef {
    pub id: DataSourceId,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    #[serde(default)]
    pub object_id: Option<i64>,
    pub path: String,
    #[serde(default)]
    pub mime_types: Vec<String>,  // candidate classifications, any may match
}

/// Kind of correlatable fact.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Files,
    Domain,
    Email,
    Phone,
    UsbDevice,
    WirelessNetwork,
    MacAddress,
    Imei,
    Imsi,
    Iccid,
}

impl AttributeType {
    pub const ALL: [AttributeType; 10] = [
        AttributeType::Files,
        AttributeType::Domain,
        AttributeType::Email,
        AttributeType::Phone,
        AttributeType::UsbDevice,
        AttributeType::WirelessNetwork,
        AttributeType::MacAddress,
        AttributeType::Imei,
        AttributeType::Imsi,
        AttributeType::Iccid,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            AttributeType::Files => "files",
            AttributeType::Domain => "domain",
            AttributeType::Email => "email",
            AttributeType::Phone => "phone",
            AttributeType::UsbDevice => "usb_device",
            AttributeType::WirelessNetwork => "wireless_network",
            AttributeType::MacAddress => "mac_address",
            AttributeType::Imei => "imei",
            AttributeType::Imsi => "imsi",
            AttributeType::Iccid => "iccid",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AttributeType::Files => "Files",
            AttributeType::Domain => "Domains",
            AttributeType::Email => "Email Addresses",
            AttributeType::Phone => "Phone Numbers",
            AttributeType::UsbDevice => "USB Devices",
            AttributeType::WirelessNetwork => "Wireless Networks",
            AttributeType::MacAddress => "MAC Addresses",
            AttributeType::Imei => "IMEI Number",
            AttributeType::Imsi => "IMSI Number",
            AttributeType::Iccid => "ICCID Number",
        }
    }

    /// Per-device identifiers have no meaningful population frequency.
    pub fn supports_frequency(&self) -> bool {
        matches!(
            self,
            AttributeType::Files
                | AttributeType::Domain
                | AttributeType::Email
                | AttributeType::Phone
                | AttributeType::WirelessNetwork
        )
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown attribute type '{0}'")]
pub struct UnknownAttributeType(pub String);

impl FromStr for AttributeType {
    type Err = UnknownAttributeType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace('-', "_");
        let ty = match key.as_str() {
            "files" | "file" | "hash" | "md5" => AttributeType::Files,
            "domain" | "domains" => AttributeType::Domain,
            "email" | "emails" => AttributeType::Email,
            "phone" | "phones" => AttributeType::Phone,
            "usb_device" | "usb" => AttributeType::UsbDevice,
            "wireless_network" | "ssid" | "wifi" => AttributeType::WirelessNetwork,
            "mac_address" | "mac" => AttributeType::MacAddress,
            "imei" => AttributeType::Imei,
            "imsi" => AttributeType::Imsi,
            "iccid" => AttributeType::Iccid,
            _ => return Err(UnknownAttributeType(s.to_string())),
        };
        Ok(ty)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum KnownStatus {
    #[default]
    Unknown,
    Known,
    Notable,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown known status '{0}', expected unknown, known or notable")]
pub struct UnknownKnownStatus(pub String);

impl FromStr for KnownStatus {
    type Err = UnknownKnownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unknown" => Ok(KnownStatus::Unknown),
            "known" => Ok(KnownStatus::Known),
            "notable" | "bad" => Ok(KnownStatus::Notable),
            _ => Err(UnknownKnownStatus(s.to_string())),
        }
    }
}

impl fmt::Display for KnownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KnownStatus::Unknown => "unknown",
            KnownStatus::Known => "known",
            KnownStatus::Notable => "notable",
        };
        f.write_str(s)
    }
}

/// One correlated occurrence of an attribute value in a file of some case.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AttributeInstance {
    pub case: CorrelationCase,
    pub data_source: DataSourceRef,
    pub file: FileRef,
    pub attribute_type: AttributeType,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_status: Option<KnownStatus>,
}

/// The working case currently open, as registered in the central repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseHandle {
    pub case: CorrelationCase,
}

impl CaseHandle {
    pub fn new(case: CorrelationCase) -> Self {
        Self { case }
    }

    pub fn id(&self) -> CaseId {
        self.case.id
    }

    pub fn display_name(&self) -> &str {
        &self.case.display_name
    }
}
