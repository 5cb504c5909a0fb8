use serde::{Deserialize, Deserializer, Serialize};

/// One labelled guess from the external classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class: String,
    pub confidence: f64,
}

/// Body returned by the external car recognition API.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub top_prediction: Option<Prediction>,
    #[serde(default, deserialize_with = "predictions_or_empty")]
    pub predictions: Vec<Prediction>,
}

/// `null` or any non-array value for `predictions` reads as an empty list.
fn predictions_or_empty<'de, D>(deserializer: D) -> Result<Vec<Prediction>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(value @ serde_json::Value::Array(_)) => {
            serde_json::from_value(value).map_err(serde::de::Error::custom)
        }
        _ => Ok(Vec::new()),
    }
}

impl ClassifierResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Car {
    pub make: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    pub confidence: f64,
}

impl Car {
    pub fn from_prediction(prediction: &Prediction) -> Self {
        let (make, model, year) = parse_label(&prediction.class);
        Car {
            make,
            model,
            year,
            confidence: normalize_confidence(prediction.confidence),
        }
    }
}

/// Splits a classifier label such as `"Toyota Corolla 2020"` into make, model and year.
///
/// The first space separated token is the make. A trailing token of exactly four
/// digits is the year; whatever sits between make and year is the model.
pub fn parse_label(label: &str) -> (String, String, Option<String>) {
    let parts: Vec<&str> = label.split(' ').collect();
    let make = parts[0].to_string();

    match parts.split_last() {
        Some((last, _)) if parts.len() > 1 && is_year(last) => {
            let model = parts[1..parts.len() - 1].join(" ");
            (make, model, Some(last.to_string()))
        }
        _ => (make, parts[1..].join(" "), None),
    }
}

fn is_year(token: &str) -> bool {
    token.len() == 4 && token.bytes().all(|b| b.is_ascii_digit())
}

/// Maps a raw classifier confidence into `[0, 1]`.
///
/// Values already inside the unit interval are kept. Anything else is assumed to
/// come from a scale topping out near 2, which is a heuristic: the upstream API
/// does not document its range.
pub fn normalize_confidence(raw: f64) -> f64 {
    if (0.0..=1.0).contains(&raw) {
        return raw;
    }
    if raw.is_nan() {
        return 0.0;
    }
    (raw / 2.0).clamp(0.0, 1.0)
}

/// Builds the ranked car list: top prediction first, then the remaining
/// predictions in upstream order minus an exact duplicate of the top entry.
pub fn cars_from_response(response: &ClassifierResponse) -> Vec<Car> {
    let top = response.top_prediction.as_ref();

    top.into_iter()
        .map(Car::from_prediction)
        .chain(
            response
                .predictions
                .iter()
                .filter(|prediction| top != Some(*prediction))
                .map(Car::from_prediction),
        )
        .collect()
}
