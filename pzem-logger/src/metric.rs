//! Metrics tracked by a recorder and their live bus values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bus::{BusValue, Subscription, ValueBus};
use crate::error::ConfigError;
use crate::teafile::{FieldType, FieldValue};

/// Storage type of a metric, written as its single character tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricType {
    #[default]
    #[serde(rename = "f")]
    Float,
    #[serde(rename = "d")]
    Double,
}

impl MetricType {
    pub fn tag(self) -> char {
        self.field_type().format_char()
    }

    pub fn field_type(self) -> FieldType {
        match self {
            MetricType::Float => FieldType::Float,
            MetricType::Double => FieldType::Double,
        }
    }

    fn field_value(self, value: f64) -> FieldValue {
        match self {
            MetricType::Float => FieldValue::Float(value as f32),
            MetricType::Double => FieldValue::Double(value),
        }
    }
}

/// A bus path recorded as one field of a series item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub path: String,
    #[serde(default, rename = "type")]
    pub ty: MetricType,
}

impl Metric {
    pub fn new(path: &str, ty: MetricType) -> Self {
        Self {
            path: path.to_string(),
            ty,
        }
    }

    pub fn float(path: &str) -> Self {
        Self::new(path, MetricType::Float)
    }

    /// Field name: the path without its leading character, `/` replaced by `_`.
    pub fn record_name(&self) -> String {
        self.path.chars().skip(1).collect::<String>().replace('/', "_")
    }

    pub fn type_tag(&self) -> char {
        self.ty.tag()
    }

    /// Value recorded when nothing was observed.
    pub fn empty(&self) -> f64 {
        f64::NAN
    }

    pub fn is_empty(&self, value: f64) -> bool {
        value.is_nan()
    }

    /// Numeric value of a bus value, empty when it has none.
    pub fn cast(&self, value: &BusValue) -> f64 {
        value.as_f64().unwrap_or_else(|| self.empty())
    }

    pub fn field_value(&self, value: f64) -> FieldValue {
        self.ty.field_value(value)
    }

    pub fn empty_field(&self) -> FieldValue {
        self.field_value(self.empty())
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path, self.type_tag())
    }
}

impl FromStr for Metric {
    type Err = ConfigError;

    /// `/History/ChargedEnergy` or `/History/ChargedEnergy:d`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, ty) = match s.rsplit_once(':') {
            Some((path, "f")) => (path, MetricType::Float),
            Some((path, "d")) => (path, MetricType::Double),
            Some((_, tag)) => {
                return Err(ConfigError::Invalid(format!("unknown metric type `{tag}`")))
            }
            None => (s, MetricType::Float),
        };
        if !path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "metric path `{path}` must start with `/`"
            )));
        }
        Ok(Self::new(path, ty))
    }
}

/// A metric bound to the bus value it follows.
#[derive(Debug)]
pub struct MetricSource {
    pub metric: Metric,
    subscription: Subscription,
}

impl MetricSource {
    pub fn new(metric: Metric, bus: &ValueBus, service: &str) -> Self {
        log::debug!("watch {service}{}", metric.path);
        let subscription = bus.subscribe(service, &metric.path);
        Self {
            metric,
            subscription,
        }
    }

    /// Latest observed value, empty if none.
    pub fn latest(&self) -> f64 {
        self.metric.cast(&self.subscription.borrow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_name() {
        assert_eq!(
            Metric::float("/History/DischargedEnergy").record_name(),
            "History_DischargedEnergy"
        );
        assert_eq!(Metric::float("/Soc").record_name(), "Soc");
    }

    #[test]
    fn test_cast() {
        let metric = Metric::float("/Soc");
        assert_eq!(metric.cast(&BusValue::Float(42.5)), 42.5);
        assert_eq!(metric.cast(&BusValue::Int(7)), 7.0);
        assert!(metric.is_empty(metric.cast(&BusValue::Text("n/a".into()))));
        assert!(metric.is_empty(metric.cast(&BusValue::Invalid)));
    }

    #[test]
    fn test_parse_metric() {
        assert_eq!(
            "/History/ChargedEnergy:d".parse::<Metric>().unwrap(),
            Metric::new("/History/ChargedEnergy", MetricType::Double)
        );
        assert_eq!("/Soc".parse::<Metric>().unwrap().type_tag(), 'f');
        assert!("Soc".parse::<Metric>().is_err());
        assert!("/Soc:x".parse::<Metric>().is_err());
    }

    #[test]
    fn test_source_follows_bus() {
        let bus = ValueBus::new();
        let source = MetricSource::new(Metric::float("/Soc"), &bus, "svc");
        assert!(source.latest().is_nan());

        let mut service = bus.register_service("svc").unwrap();
        service.add_path("/Soc", 80.0);
        assert_eq!(source.latest(), 80.0);

        drop(service);
        assert!(source.latest().is_nan());
    }
}
