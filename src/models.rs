//! Data models.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use serde_helpers::*;

/// Vehicle position
///
/// One observation of one bus or trolley, as reported by the TransitView
/// feed at fetch time.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(from = "WirePosition")]
pub struct VehiclePosition {
    /// Latitude in WGS84 decimal degrees, sent as a quoted string
    pub latitude: f64,
    /// Longitude in WGS84 decimal degrees, sent as a quoted string
    pub longitude: f64,
    /// Display label
    pub label: String,
    pub vehicle_id: String,
    pub block_id: String,
    pub trip: String,
    /// Free-text direction, e.g. `NorthBound`
    pub direction: String,
    pub destination: String,
    /// Minutes part of the schedule offset
    pub offset_minutes: i32,
    /// Seconds part of the schedule offset
    pub offset_seconds: i32,
    /// Heading in degrees
    pub heading: i32,
    /// Minutes behind schedule, negative when early
    pub late_minutes: i32,
}

/// Position object as it appears in the feed.
///
/// The feed spells the offset minutes key both `offset` and `Offset`, and
/// some objects carry both. They are read as separate keys; `offset` wins
/// when both hold a value.
#[derive(Deserialize)]
struct WirePosition {
    #[serde(deserialize_with = "deserialize_quoted")]
    lat: f64,
    #[serde(deserialize_with = "deserialize_quoted")]
    lng: f64,
    #[serde(default, deserialize_with = "deserialize_string_or_default")]
    label: String,
    #[serde(
        rename = "VehicleID",
        default,
        deserialize_with = "deserialize_string_or_default"
    )]
    vehicle_id: String,
    #[serde(
        rename = "BlockID",
        default,
        deserialize_with = "deserialize_string_or_default"
    )]
    block_id: String,
    #[serde(default, deserialize_with = "deserialize_string_or_default")]
    trip: String,
    #[serde(
        rename = "Direction",
        default,
        deserialize_with = "deserialize_string_or_default"
    )]
    direction: String,
    #[serde(default, deserialize_with = "deserialize_string_or_default")]
    destination: String,
    #[serde(default, deserialize_with = "deserialize_quoted_option")]
    offset: Option<i32>,
    #[serde(
        rename = "Offset",
        default,
        deserialize_with = "deserialize_quoted_option"
    )]
    offset_capitalized: Option<i32>,
    #[serde(
        rename = "Offset_sec",
        default,
        deserialize_with = "deserialize_quoted_or_default"
    )]
    offset_sec: i32,
    #[serde(default, deserialize_with = "deserialize_int_or_default")]
    heading: i32,
    #[serde(default, deserialize_with = "deserialize_int_or_default")]
    late: i32,
}

impl From<WirePosition> for VehiclePosition {
    fn from(wire: WirePosition) -> Self {
        Self {
            latitude: wire.lat,
            longitude: wire.lng,
            label: wire.label,
            vehicle_id: wire.vehicle_id,
            block_id: wire.block_id,
            trip: wire.trip,
            direction: wire.direction,
            destination: wire.destination,
            offset_minutes: wire
                .offset
                .or(wire.offset_capitalized)
                .unwrap_or_default(),
            offset_seconds: wire.offset_sec,
            heading: wire.heading,
            late_minutes: wire.late,
        }
    }
}

impl fmt::Display for VehiclePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} (#{}): {} towards {}",
            self.label, self.vehicle_id, self.direction, self.destination
        )?;
        writeln!(
            f,
            "offset: {:02}:{:02}",
            self.offset_minutes, self.offset_seconds
        )?;
        writeln!(f, "late: {}", self.late_minutes)?;
        write!(
            f,
            "position: {:.5} lat, {:.5} lon, {} deg",
            self.latitude, self.longitude, self.heading
        )
    }
}

/// All vehicle positions observed in one fetch, keyed by route label
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(transparent)]
pub struct RouteSnapshot(HashMap<String, Vec<VehiclePosition>>);

impl RouteSnapshot {
    /// Iterate over routes and their positions, in no particular order
    pub fn routes(&self) -> impl Iterator<Item = (&str, &[VehiclePosition])> {
        self.0
            .iter()
            .map(|(route, positions)| (route.as_str(), positions.as_slice()))
    }

    pub fn get(&self, route: &str) -> Option<&[VehiclePosition]> {
        self.0.get(route).map(Vec::as_slice)
    }

    pub fn route_count(&self) -> usize {
        self.0.len()
    }

    /// Total number of positions over all routes
    pub fn position_count(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    /// True when no route carries a vehicle, even if routes are listed
    pub fn is_empty(&self) -> bool {
        self.position_count() == 0
    }
}

impl FromIterator<(String, Vec<VehiclePosition>)> for RouteSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, Vec<VehiclePosition>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Custom deserializers
mod serde_helpers {
    use std::fmt;
    use std::str::FromStr;

    use serde::{de, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Quoted<T> {
        Text(String),
        Number(T),
    }

    impl<T> Quoted<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        fn into_value<E: de::Error>(self) -> Result<T, E> {
            match self {
                Quoted::Text(text) => text
                    .trim()
                    .parse()
                    .map_err(|e| E::custom(format!("invalid number {:?}: {}", text, e))),
                Quoted::Number(value) => Ok(value),
            }
        }
    }

    /// Number that the feed usually sends as a quoted string.
    ///
    /// Bare JSON numbers are accepted as well; a string that does not parse
    /// is an error.
    pub fn deserialize_quoted<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + FromStr,
        T::Err: fmt::Display,
    {
        Quoted::<T>::deserialize(deserializer)?.into_value()
    }

    /// Like [`deserialize_quoted`], with `null` read as `None`
    pub fn deserialize_quoted_option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + FromStr,
        T::Err: fmt::Display,
    {
        match Option::<Quoted<T>>::deserialize(deserializer)? {
            Some(quoted) => quoted.into_value().map(Some),
            None => Ok(None),
        }
    }

    /// Like [`deserialize_quoted`], with `null` read as zero
    pub fn deserialize_quoted_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + FromStr + Default,
        T::Err: fmt::Display,
    {
        Ok(deserialize_quoted_option(deserializer)?.unwrap_or_default())
    }

    pub fn deserialize_string_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
    }

    pub fn deserialize_int_or_default<'de, D>(deserializer: D) -> Result<i32, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<i32>::deserialize(deserializer)?.unwrap_or_default())
    }
}
