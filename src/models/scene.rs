use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, SecondsFormat, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use tracing::warn;

use crate::error::{AppError, AppResult};

pub type SceneId = String;

/// Whole-collection snapshot, keyed by the id the store assigned.
pub type SceneMap = BTreeMap<SceneId, Scene>;

pub const MIN_TEMPERATURE: i32 = 10;
pub const MAX_TEMPERATURE: i32 = 40;
pub const DEFAULT_TEMPERATURE: i32 = 25;
pub const DEFAULT_SCHEDULE_TIME: &str = "19:00";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(skip)]
    pub id: SceneId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "descripcion", default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub actions: SceneActions,
    #[serde(default, deserialize_with = "deserialize_schedule")]
    pub schedule: Schedule,
    #[serde(default)]
    pub active: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub history: BTreeMap<String, HistoryEntry>,
    /// Fields this crate does not model; written back untouched.
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: SceneId::new(),
            name: name.into(),
            description: String::new(),
            actions: SceneActions::default(),
            schedule: Schedule::default(),
            active: false,
            history: BTreeMap::new(),
            extra: JsonMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<SceneId>) -> Self {
        self.id = id.into();
        self
    }

    /// Appends one history entry and returns its key.
    pub fn record_activation(&mut self, trigger: TriggerType, at: DateTime<Utc>) -> String {
        let key = uuid::Uuid::new_v4().simple().to_string();
        self.history.insert(
            key.clone(),
            HistoryEntry {
                date: at.to_rfc3339_opts(SecondsFormat::Millis, true),
                trigger,
            },
        );
        key
    }

    /// Drops the oldest entries so that at most `limit` remain.
    pub fn truncate_history(&mut self, limit: usize) {
        if self.history.len() <= limit {
            return;
        }
        let excess = self.history.len() - limit;
        let stale: Vec<String> = self
            .history_oldest_first()
            .into_iter()
            .take(excess)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            self.history.remove(&key);
        }
    }

    pub fn history_newest_first(&self) -> Vec<(&String, &HistoryEntry)> {
        let mut entries = self.history_oldest_first();
        entries.reverse();
        entries
    }

    fn history_oldest_first(&self) -> Vec<(&String, &HistoryEntry)> {
        let mut entries: Vec<_> = self.history.iter().collect();
        entries.sort_by(|(key_a, a), (key_b, b)| {
            a.timestamp()
                .cmp(&b.timestamp())
                .then_with(|| key_a.cmp(key_b))
        });
        entries
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub date: String,
    #[serde(rename = "type")]
    pub trigger: TriggerType,
}

impl HistoryEntry {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.date)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Provenance of a history entry. Unrecognised tags are kept verbatim so that
/// rewriting the collection never alters stored history.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TriggerType {
    Manual,
    Automatic,
    Unrecognized(String),
}

impl TriggerType {
    pub fn as_str(&self) -> &str {
        match self {
            TriggerType::Manual => "MANUAL",
            TriggerType::Automatic => "AUTOMATIC",
            TriggerType::Unrecognized(raw) => raw.as_str(),
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TriggerType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TriggerType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "MANUAL" => TriggerType::Manual,
            "AUTOMATIC" => TriggerType::Automatic,
            _ => TriggerType::Unrecognized(raw),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DayOfWeek {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Mon,
        DayOfWeek::Tue,
        DayOfWeek::Wed,
        DayOfWeek::Thu,
        DayOfWeek::Fri,
        DayOfWeek::Sat,
        DayOfWeek::Sun,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DayOfWeek::Mon => "mon",
            DayOfWeek::Tue => "tue",
            DayOfWeek::Wed => "wed",
            DayOfWeek::Thu => "thu",
            DayOfWeek::Fri => "fri",
            DayOfWeek::Sat => "sat",
            DayOfWeek::Sun => "sun",
        }
    }

    /// Reads a stored symbol. Accepts the two-letter Spanish keys older
    /// records were written with.
    pub fn from_stored(value: &str) -> Option<Self> {
        let normalized = value.trim().to_lowercase();
        if let Some(day) = DayOfWeek::ALL
            .into_iter()
            .find(|day| day.as_str() == normalized)
        {
            return Some(day);
        }
        match normalized.as_str() {
            "lu" => Some(DayOfWeek::Mon),
            "ma" => Some(DayOfWeek::Tue),
            "mi" => Some(DayOfWeek::Wed),
            "ju" => Some(DayOfWeek::Thu),
            "vi" => Some(DayOfWeek::Fri),
            "sa" => Some(DayOfWeek::Sat),
            "do" => Some(DayOfWeek::Sun),
            _ => None,
        }
    }

    pub fn days_from_monday(self) -> u32 {
        self.weekday().num_days_from_monday()
    }

    pub fn weekday(self) -> Weekday {
        match self {
            DayOfWeek::Mon => Weekday::Mon,
            DayOfWeek::Tue => Weekday::Tue,
            DayOfWeek::Wed => Weekday::Wed,
            DayOfWeek::Thu => Weekday::Thu,
            DayOfWeek::Fri => Weekday::Fri,
            DayOfWeek::Sat => Weekday::Sat,
            DayOfWeek::Sun => Weekday::Sun,
        }
    }
}

impl From<Weekday> for DayOfWeek {
    fn from(value: Weekday) -> Self {
        match value {
            Weekday::Mon => DayOfWeek::Mon,
            Weekday::Tue => DayOfWeek::Tue,
            Weekday::Wed => DayOfWeek::Wed,
            Weekday::Thu => DayOfWeek::Thu,
            Weekday::Fri => DayOfWeek::Fri,
            Weekday::Sat => DayOfWeek::Sat,
            Weekday::Sun => DayOfWeek::Sun,
        }
    }
}

impl FromStr for DayOfWeek {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DayOfWeek::ALL
            .into_iter()
            .find(|day| day.as_str() == s)
            .ok_or_else(|| {
                AppError::validation_with_details(
                    "invalid day symbol",
                    json!({ "value": s, "allowed": DayOfWeek::ALL.map(DayOfWeek::as_str) }),
                )
            })
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for DayOfWeek {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DayOfWeek {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DayOfWeek::from_stored(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown day symbol `{raw}`")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, deserialize_with = "deserialize_days")]
    pub days: BTreeSet<DayOfWeek>,
    #[serde(default = "default_schedule_time")]
    pub time: String,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            enabled: false,
            days: BTreeSet::new(),
            time: default_schedule_time(),
        }
    }
}

impl Schedule {
    /// Parsed trigger time; `None` unless `time` is a zero-padded `HH:MM`.
    pub fn trigger_time(&self) -> Option<NaiveTime> {
        parse_hhmm(&self.time)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.trigger_time().is_none() {
            return Err(AppError::validation_with_details(
                "schedule time must be a zero-padded HH:MM",
                json!({ "time": self.time }),
            ));
        }
        Ok(())
    }
}

pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    let bytes = value.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return None;
    }
    NaiveTime::parse_from_str(value, "%H:%M").ok()
}

fn default_schedule_time() -> String {
    DEFAULT_SCHEDULE_TIME.to_string()
}

fn deserialize_schedule<'de, D>(deserializer: D) -> Result<Schedule, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Schedule>::deserialize(deserializer)?.unwrap_or_default())
}

fn deserialize_days<'de, D>(deserializer: D) -> Result<BTreeSet<DayOfWeek>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<JsonValue>>::deserialize(deserializer)?.unwrap_or_default();
    let mut days = BTreeSet::new();
    for value in raw {
        match value.as_str().and_then(DayOfWeek::from_stored) {
            Some(day) => {
                days.insert(day);
            }
            None => {
                warn!(target: "app::scenes", value = %value, "dropping unknown day symbol");
            }
        }
    }
    Ok(days)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const WHITE: RgbColor = RgbColor {
        r: 255,
        g: 255,
        b: 255,
    };

    /// Parses `rgb(r, g, b)` or `#rrggbb`.
    pub fn parse_css(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Some(hex) = value.strip_prefix('#') {
            if hex.len() != 6 {
                return None;
            }
            let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
            return Some(RgbColor {
                r: channel(0..2)?,
                g: channel(2..4)?,
                b: channel(4..6)?,
            });
        }

        let inner = value.strip_prefix("rgb(")?.strip_suffix(')')?;
        let mut parts = inner.split(',').map(|part| part.trim().parse::<u8>().ok());
        let color = RgbColor {
            r: parts.next()??,
            g: parts.next()??,
            b: parts.next()??,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(color)
    }
}

impl Default for RgbColor {
    fn default() -> Self {
        RgbColor::WHITE
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Toggle {
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LightState {
    pub enabled: bool,
    pub color: RgbColor,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MusicState {
    pub enabled: bool,
    pub playlist: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureState {
    pub enabled: bool,
    pub degrees: i32,
}

impl Default for TemperatureState {
    fn default() -> Self {
        Self {
            enabled: false,
            degrees: DEFAULT_TEMPERATURE,
        }
    }
}

/// One device, normalised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    WaterJets(Toggle),
    Lights(LightState),
    Music(MusicState),
    Temperature(TemperatureState),
    Cleaning(Toggle),
}

impl DeviceState {
    pub fn enabled(&self) -> bool {
        match self {
            DeviceState::WaterJets(toggle) | DeviceState::Cleaning(toggle) => toggle.enabled,
            DeviceState::Lights(lights) => lights.enabled,
            DeviceState::Music(music) => music.enabled,
            DeviceState::Temperature(temperature) => temperature.enabled,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawActions", into = "WireActions")]
pub struct SceneActions {
    pub water_jets: Toggle,
    pub lights: LightState,
    pub music: MusicState,
    pub temperature: TemperatureState,
    pub cleaning: Toggle,
    /// Devices this crate does not know about, kept as stored.
    pub extra: JsonMap<String, JsonValue>,
}

impl SceneActions {
    pub fn devices(&self) -> Vec<DeviceState> {
        vec![
            DeviceState::WaterJets(self.water_jets),
            DeviceState::Lights(self.lights),
            DeviceState::Music(self.music.clone()),
            DeviceState::Temperature(self.temperature),
            DeviceState::Cleaning(self.cleaning),
        ]
    }

    pub fn any_enabled(&self) -> bool {
        self.devices().iter().any(DeviceState::enabled)
    }

    pub fn validate(&self) -> AppResult<()> {
        let degrees = self.temperature.degrees;
        if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&degrees) {
            return Err(AppError::validation_with_details(
                "target temperature out of range",
                json!({ "degrees": degrees, "min": MIN_TEMPERATURE, "max": MAX_TEMPERATURE }),
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDevice {
    Flag(bool),
    Object(RawDeviceObject),
    Other(JsonValue),
}

#[derive(Deserialize, Default)]
struct RawDeviceObject {
    #[serde(default)]
    estado: Option<bool>,
    #[serde(default)]
    color: Option<RawColor>,
    #[serde(default)]
    grados: Option<f64>,
    #[serde(default)]
    playlist: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawColor {
    Channels {
        r: Option<f64>,
        g: Option<f64>,
        b: Option<f64>,
    },
    Css(String),
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawActions {
    #[serde(rename = "chorrosAgua")]
    water_jets: Option<RawDevice>,
    luces: Option<RawDevice>,
    musica: Option<RawDevice>,
    temperatura: Option<RawDevice>,
    limpieza: Option<RawDevice>,
    #[serde(flatten)]
    extra: JsonMap<String, JsonValue>,
}

impl RawDevice {
    fn into_parts(self) -> (bool, RawDeviceObject) {
        match self {
            RawDevice::Flag(enabled) => (enabled, RawDeviceObject::default()),
            RawDevice::Object(object) => (object.estado.unwrap_or(false), object),
            RawDevice::Other(value) => {
                warn!(target: "app::scenes", value = %value, "unrecognised device state, treating as disabled");
                (false, RawDeviceObject::default())
            }
        }
    }
}

fn channel(value: Option<f64>) -> u8 {
    value.unwrap_or(0.0).round().clamp(0.0, 255.0) as u8
}

fn normalize_color(raw: Option<RawColor>) -> RgbColor {
    match raw {
        None
        | Some(RawColor::Channels {
            r: None,
            g: None,
            b: None,
        }) => RgbColor::WHITE,
        Some(RawColor::Channels { r, g, b }) => RgbColor {
            r: channel(r),
            g: channel(g),
            b: channel(b),
        },
        Some(RawColor::Css(value)) => RgbColor::parse_css(&value).unwrap_or_else(|| {
            warn!(target: "app::scenes", %value, "unparseable light color, using white");
            RgbColor::WHITE
        }),
    }
}

fn toggle(raw: Option<RawDevice>) -> Toggle {
    Toggle {
        enabled: raw.map(|device| device.into_parts().0).unwrap_or(false),
    }
}

impl From<RawActions> for SceneActions {
    fn from(raw: RawActions) -> Self {
        let lights = match raw.luces {
            Some(device) => {
                let (enabled, object) = device.into_parts();
                LightState {
                    enabled,
                    color: normalize_color(object.color),
                }
            }
            None => LightState::default(),
        };

        let music = match raw.musica {
            Some(device) => {
                let (enabled, object) = device.into_parts();
                MusicState {
                    enabled,
                    playlist: object.playlist.filter(|url| !url.trim().is_empty()),
                }
            }
            None => MusicState::default(),
        };

        let temperature = match raw.temperatura {
            Some(device) => {
                let (enabled, object) = device.into_parts();
                TemperatureState {
                    enabled,
                    degrees: object
                        .grados
                        .map(|value| value.round() as i32)
                        .unwrap_or(DEFAULT_TEMPERATURE),
                }
            }
            None => TemperatureState::default(),
        };

        SceneActions {
            water_jets: toggle(raw.water_jets),
            lights,
            music,
            temperature,
            cleaning: toggle(raw.limpieza),
            extra: raw.extra,
        }
    }
}

#[derive(Serialize)]
struct WireActions {
    #[serde(rename = "chorrosAgua")]
    water_jets: bool,
    luces: WireLights,
    musica: WireMusic,
    temperatura: WireTemperature,
    limpieza: bool,
    #[serde(flatten)]
    extra: JsonMap<String, JsonValue>,
}

#[derive(Serialize)]
struct WireLights {
    estado: bool,
    color: RgbColor,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireMusic {
    Flag(bool),
    WithPlaylist { estado: bool, playlist: String },
}

#[derive(Serialize)]
struct WireTemperature {
    estado: bool,
    grados: i32,
}

impl From<SceneActions> for WireActions {
    fn from(actions: SceneActions) -> Self {
        let musica = match actions.music.playlist {
            Some(playlist) => WireMusic::WithPlaylist {
                estado: actions.music.enabled,
                playlist,
            },
            None => WireMusic::Flag(actions.music.enabled),
        };

        WireActions {
            water_jets: actions.water_jets.enabled,
            luces: WireLights {
                estado: actions.lights.enabled,
                color: actions.lights.color,
            },
            musica,
            temperatura: WireTemperature {
                estado: actions.temperature.enabled,
                grados: actions.temperature.degrees,
            },
            limpieza: actions.cleaning.enabled,
            extra: actions.extra,
        }
    }
}

/// Editable part of a scene, as submitted by the create and edit forms.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub actions: SceneActions,
    #[serde(default)]
    pub schedule: ScheduleInput,
}

/// Schedule as submitted; day symbols are checked strictly before storing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleInput {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub days: Vec<String>,
    #[serde(default = "default_schedule_time")]
    pub time: String,
}

impl Default for ScheduleInput {
    fn default() -> Self {
        Self {
            enabled: false,
            days: Vec::new(),
            time: default_schedule_time(),
        }
    }
}

impl ScheduleInput {
    pub fn into_schedule(self) -> AppResult<Schedule> {
        let days = self
            .days
            .iter()
            .map(|day| day.trim().parse::<DayOfWeek>())
            .collect::<AppResult<BTreeSet<_>>>()?;
        let schedule = Schedule {
            enabled: self.enabled,
            days,
            time: self.time.trim().to_string(),
        };
        schedule.validate()?;
        Ok(schedule)
    }
}
