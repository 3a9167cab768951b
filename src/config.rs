use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use actix_web::http::Uri;
use thiserror::Error;

use crate::classifier::InputLayout;
use crate::preprocess::BrightnessRange;

pub const DEFAULT_IMAGE_SIZE: u32 = 256;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.50;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub model_path: PathBuf,
    pub input_layout: InputLayout,
    pub image_size: u32,
    pub confidence_threshold: f32,
    pub brightness: BrightnessRange,
    pub max_upload_bytes: usize,
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            model_path: PathBuf::from("saved_models/1.onnx"),
            input_layout: InputLayout::Nhwc,
            image_size: DEFAULT_IMAGE_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            brightness: BrightnessRange::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            cors_origins: vec![
                "http://localhost".to_string(),
                "http://localhost:3000".to_string(),
            ],
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Builds a config from an explicit variable map. Missing keys keep their defaults.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let image_size: u32 = parse_or(vars, "IMAGE_SIZE", defaults.image_size)?;
        if image_size == 0 {
            return Err(invalid("IMAGE_SIZE", "must be greater than zero"));
        }

        let confidence_threshold: f32 =
            parse_or(vars, "CONFIDENCE_THRESHOLD", defaults.confidence_threshold)?;
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(invalid("CONFIDENCE_THRESHOLD", "must be within [0, 1]"));
        }

        let brightness = BrightnessRange {
            min: parse_or(vars, "MIN_BRIGHTNESS", defaults.brightness.min)?,
            max: parse_or(vars, "MAX_BRIGHTNESS", defaults.brightness.max)?,
        };
        if brightness.min > brightness.max {
            return Err(invalid(
                "MIN_BRIGHTNESS",
                "must not exceed MAX_BRIGHTNESS",
            ));
        }

        let cors_origins = match vars.get("CORS_ORIGINS") {
            Some(raw) => parse_origins(raw)?,
            None => defaults.cors_origins,
        };

        Ok(Config {
            host: vars.get("HOST").cloned().unwrap_or(defaults.host),
            port: parse_or(vars, "PORT", defaults.port)?,
            model_path: vars
                .get("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_path),
            input_layout: parse_or(vars, "MODEL_INPUT_LAYOUT", defaults.input_layout)?,
            image_size,
            confidence_threshold,
            brightness,
            max_upload_bytes: parse_or(vars, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            cors_origins,
        })
    }
}

fn parse_or<T>(vars: &HashMap<String, String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match vars.get(var) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| invalid(var, e.to_string())),
        None => Ok(default),
    }
}

/// Origins must be concrete `scheme://host[:port]` values; credentialed CORS
/// cannot use a wildcard.
fn parse_origins(raw: &str) -> Result<Vec<String>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| {
            if origin == "*" {
                return Err(invalid("CORS_ORIGINS", "wildcard origin is not allowed"));
            }
            let uri = origin
                .parse::<Uri>()
                .map_err(|e| invalid("CORS_ORIGINS", format!("'{origin}': {e}")))?;
            if uri.scheme().is_none() || uri.host().is_none() {
                return Err(invalid(
                    "CORS_ORIGINS",
                    format!("'{origin}' is not a scheme://host origin"),
                ));
            }
            Ok(origin.to_string())
        })
        .collect()
}

fn invalid(var: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        var,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_env_yields_defaults() {
        let config = Config::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.image_size, 256);
        assert_eq!(config.confidence_threshold, 0.50);
        assert_eq!(config.brightness.min, 30.0);
        assert_eq!(config.brightness.max, 240.0);
        assert_eq!(config.input_layout, InputLayout::Nhwc);
        assert_eq!(config.cors_origins.len(), 2);
    }

    #[test]
    fn overrides_are_applied() {
        let config = Config::from_vars(&vars(&[
            ("PORT", "9000"),
            ("MODEL_PATH", "/models/potato.onnx"),
            ("MODEL_INPUT_LAYOUT", "NCHW"),
            ("CONFIDENCE_THRESHOLD", "0.7"),
            ("CORS_ORIGINS", "https://a.example, ,https://b.example"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.model_path, PathBuf::from("/models/potato.onnx"));
        assert_eq!(config.input_layout, InputLayout::Nchw);
        assert_eq!(config.confidence_threshold, 0.7);
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = Config::from_vars(&vars(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));

        let err = Config::from_vars(&vars(&[("CONFIDENCE_THRESHOLD", "1.5")])).unwrap_err();
        assert!(err.to_string().contains("CONFIDENCE_THRESHOLD"));

        let err = Config::from_vars(&vars(&[("IMAGE_SIZE", "0")])).unwrap_err();
        assert!(err.to_string().contains("IMAGE_SIZE"));

        let err = Config::from_vars(&vars(&[("MIN_BRIGHTNESS", "250")])).unwrap_err();
        assert!(err.to_string().contains("MIN_BRIGHTNESS"));
    }

    #[test]
    fn unusable_cors_origins_are_rejected() {
        for raw in ["*", "http://ok.example,*", "not a uri", "localhost:3000", "/relative"] {
            let err = Config::from_vars(&vars(&[("CORS_ORIGINS", raw)])).unwrap_err();
            assert!(err.to_string().contains("CORS_ORIGINS"), "{raw} accepted");
        }
    }
}
