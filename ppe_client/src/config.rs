use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub detection_service: DetectionServiceConfig,
    #[serde(default)]
    pub intake: IntakeConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

fn deserialize_color<'de, D>(deserializer: D) -> Result<HexColor, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DetectionServiceConfig {
    pub base_url: String,
    #[serde(default = "default_detect_path")]
    pub path: String,
    #[serde(default = "default_field_name")]
    pub field_name: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_detect_path() -> String {
    "/detect".into()
}

fn default_field_name() -> String {
    "file".into()
}

fn default_timeout_secs() -> u64 {
    60
}

impl DetectionServiceConfig {
    pub fn get_endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.path)
    }
}

/// Limits applied when a file is staged.
#[derive(Debug, Deserialize, Clone)]
pub struct IntakeConfig {
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
    #[serde(default = "default_enforce_size_limit")]
    pub enforce_size_limit: bool,
}

fn default_max_file_size_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_enforce_size_limit() -> bool {
    true
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size_bytes(),
            enforce_size_limit: default_enforce_size_limit(),
        }
    }
}

impl IntakeConfig {
    /// Upper bound for request bodies carrying an upload, multipart framing included.
    pub fn get_body_limit(&self) -> usize {
        (self.max_file_size_bytes as usize).saturating_add(64 * 1024)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RenderConfig {
    #[serde(default = "default_compliant_label")]
    pub compliant_label: String,
    #[serde(
        default = "default_compliant_color",
        deserialize_with = "deserialize_color"
    )]
    pub compliant_color: HexColor,
    #[serde(
        default = "default_violation_color",
        deserialize_with = "deserialize_color"
    )]
    pub violation_color: HexColor,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: u32,
    /// Labels are drawn only when a font is configured.
    #[serde(default)]
    pub label_font_path: Option<PathBuf>,
    #[serde(default = "default_label_scale")]
    pub label_scale: f32,
}

fn default_compliant_label() -> String {
    "Hardhat".into()
}

fn default_compliant_color() -> HexColor {
    HexColor([0x22, 0xc5, 0x5e])
}

fn default_violation_color() -> HexColor {
    HexColor([0xef, 0x44, 0x44])
}

fn default_stroke_width() -> u32 {
    4
}

fn default_label_scale() -> f32 {
    18.0
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            compliant_label: default_compliant_label(),
            compliant_color: default_compliant_color(),
            violation_color: default_violation_color(),
            stroke_width: default_stroke_width(),
            label_font_path: None,
            label_scale: default_label_scale(),
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.stroke_width == 0 {
            return Err("render.stroke_width must be at least 1".into());
        }
        if let Some(path) = &self.label_font_path {
            if !path.exists() {
                return Err(format!("Label font not found: {:?}", path));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportConfig {
    #[serde(default = "default_download_filename")]
    pub download_filename: String,
}

fn default_download_filename() -> String {
    "ppe_report.pdf".into()
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            download_filename: default_download_filename(),
        }
    }
}

/// An RGB color written as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HexColor(pub [u8; 3]);

impl HexColor {
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0[0], self.0[1], self.0[2])
    }
}

impl TryFrom<String> for HexColor {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let digits = s.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!(
                "{} is not a supported color. Use the `#rrggbb` notation.",
                s
            ));
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16);
        match (channel(0), channel(2), channel(4)) {
            (Ok(r), Ok(g), Ok(b)) => Ok(Self([r, g, b])),
            _ => Err(format!("{} is not a valid hex color.", s)),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir().map_err(|e| {
        config::ConfigError::Message(format!("Failed to determine the current directory: {}", e))
    })?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(config::File::from(
            configuration_directory.join(format!("{}.yaml", environment.as_str())),
        ))
        .add_source(
            config::Environment::with_prefix("PPE")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config: Config = config.try_deserialize::<Config>()?;

    if let Err(e) = config.render.validate() {
        tracing::error!("Configuration validation failed: {}", e);
        return Err(config::ConfigError::Message(e));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_color_parsing() {
        let color: HexColor = "#22c55e".to_string().try_into().unwrap();
        assert_eq!(color, HexColor([34, 197, 94]));
        assert_eq!(color.to_hex(), "#22c55e");

        let bare: HexColor = "EF4444".to_string().try_into().unwrap();
        assert_eq!(bare, HexColor([239, 68, 68]));

        assert!(HexColor::try_from("#12345".to_string()).is_err());
        assert!(HexColor::try_from("#zzzzzz".to_string()).is_err());
    }

    #[test]
    fn test_endpoint_joins_base_url_and_path() {
        let cfg = DetectionServiceConfig {
            base_url: "http://localhost:8000/".into(),
            path: default_detect_path(),
            field_name: default_field_name(),
            timeout_secs: default_timeout_secs(),
        };
        assert_eq!(cfg.get_endpoint(), "http://localhost:8000/detect");
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r##"
server:
  host: 127.0.0.1
  port: 3000
log_level: DEBUG
detection_service:
  base_url: http://localhost:8000
render:
  violation_color: "#ff0000"
"##;
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.server.get_address(), "127.0.0.1:3000");
        assert_eq!(config.log_level.as_str(), "debug");
        assert_eq!(config.detection_service.field_name, "file");
        assert_eq!(config.intake.max_file_size_bytes, 10 * 1024 * 1024);
        assert!(config.intake.enforce_size_limit);
        assert_eq!(config.render.compliant_label, "Hardhat");
        assert_eq!(config.render.compliant_color, HexColor([0x22, 0xc5, 0x5e]));
        assert_eq!(config.render.violation_color, HexColor([255, 0, 0]));
        assert_eq!(config.report.download_filename, "ppe_report.pdf");
    }

    #[test]
    fn test_render_config_validation() {
        let mut render = RenderConfig::default();
        assert!(render.validate().is_ok());

        render.stroke_width = 0;
        assert!(render.validate().is_err());

        render.stroke_width = 4;
        render.label_font_path = Some(PathBuf::from("/nonexistent/font.ttf"));
        assert!(render.validate().is_err());
    }
}
