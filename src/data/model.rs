use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Mammal – one row of the sleep table
// ---------------------------------------------------------------------------

/// One mammal of the sleep dataset. Missing values (`NA`) are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mammal {
    pub name: String,
    #[serde(default, deserialize_with = "na_string")]
    pub genus: Option<String>,
    /// Diet: carni / herbi / insecti / omni.
    #[serde(default, deserialize_with = "na_string")]
    pub vore: Option<String>,
    #[serde(default, deserialize_with = "na_string")]
    pub order: Option<String>,
    #[serde(default, deserialize_with = "na_string")]
    pub conservation: Option<String>,
    /// Total daily sleep, hours.
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub sleep_total: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub sleep_rem: Option<f64>,
    /// Length of the sleep cycle, hours.
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub sleep_cycle: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub awake: Option<f64>,
    /// Brain weight, kg.
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub brainwt: Option<f64>,
    /// Body weight, kg.
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub bodywt: Option<f64>,
}

/// Strings where `NA` or the empty string mean "missing".
fn na_string<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(de)?;
    Ok(raw.filter(|s| !s.is_empty() && s != "NA"))
}

impl Mammal {
    /// Level of a categorical column (`None` when missing).
    pub fn level(&self, factor: Factor) -> Option<&str> {
        match factor {
            Factor::Vore => self.vore.as_deref(),
            Factor::Order => self.order.as_deref(),
            Factor::Conservation => self.conservation.as_deref(),
        }
    }

    /// Natural log of brain weight, when brain weight is known and positive.
    pub fn log_brainwt(&self) -> Option<f64> {
        self.brainwt.filter(|w| *w > 0.0).map(f64::ln)
    }
}

// ---------------------------------------------------------------------------
// Factor – the categorical columns available for filtering / colouring
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Factor {
    Vore,
    Order,
    Conservation,
}

impl Factor {
    pub const ALL: [Factor; 3] = [Factor::Vore, Factor::Order, Factor::Conservation];

    pub fn column_name(self) -> &'static str {
        match self {
            Factor::Vore => "vore",
            Factor::Order => "order",
            Factor::Conservation => "conservation",
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// A level of a factor; `None` stands for a missing value.
pub type Level = Option<String>;

/// Display text for a level.
pub fn level_label(level: &Level) -> &str {
    level.as_deref().unwrap_or("<NA>")
}

// ---------------------------------------------------------------------------
// MammalDataset – the complete loaded table
// ---------------------------------------------------------------------------

/// The parsed dataset with pre-computed factor levels.
#[derive(Debug, Clone)]
pub struct MammalDataset {
    pub mammals: Vec<Mammal>,
    /// For each factor the sorted set of levels present.
    pub levels: BTreeMap<Factor, BTreeSet<Level>>,
}

impl MammalDataset {
    /// Build factor indices from the loaded rows.
    pub fn from_mammals(mammals: Vec<Mammal>) -> Self {
        let mut levels: BTreeMap<Factor, BTreeSet<Level>> = BTreeMap::new();
        for m in &mammals {
            for factor in Factor::ALL {
                levels
                    .entry(factor)
                    .or_default()
                    .insert(m.level(factor).map(str::to_string));
            }
        }
        MammalDataset { mammals, levels }
    }

    pub fn len(&self) -> usize {
        self.mammals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mammals.is_empty()
    }

    /// Rows that can enter the regression: known brain weight and sleep.
    pub fn usable_count(&self) -> usize {
        self.mammals
            .iter()
            .filter(|m| m.log_brainwt().is_some() && m.sleep_total.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mammal(name: &str, vore: Option<&str>, brainwt: Option<f64>) -> Mammal {
        Mammal {
            name: name.to_string(),
            genus: None,
            vore: vore.map(str::to_string),
            order: Some("Rodentia".to_string()),
            conservation: None,
            sleep_total: Some(10.0),
            sleep_rem: None,
            sleep_cycle: None,
            awake: Some(14.0),
            brainwt,
            bodywt: Some(1.0),
        }
    }

    #[test]
    fn levels_include_missing() {
        let ds = MammalDataset::from_mammals(vec![
            mammal("a", Some("omni"), Some(0.01)),
            mammal("b", None, None),
            mammal("c", Some("herbi"), Some(0.0)),
        ]);
        let vore = &ds.levels[&Factor::Vore];
        assert_eq!(vore.len(), 3);
        assert!(vore.contains(&None));
        assert!(vore.contains(&Some("omni".to_string())));
        assert_eq!(ds.levels[&Factor::Order].len(), 1);
        // zero brain weight has no logarithm
        assert_eq!(ds.usable_count(), 1);
    }

    #[test]
    fn log_brainwt_is_natural_log() {
        let m = mammal("x", None, Some(std::f64::consts::E));
        assert!((m.log_brainwt().unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(level_label(&None), "<NA>");
        assert_eq!(Factor::Conservation.to_string(), "conservation");
    }
}
