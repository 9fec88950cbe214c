//! Microsegment key chains: the fully-qualified identity of one baseline market slice.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

/// Whether a microsegment is the measure's own market or a coupled load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    Primary,
    Secondary,
}

impl Segment {
    pub fn as_str(self) -> &'static str {
        match self {
            Segment::Primary => "primary",
            Segment::Secondary => "secondary",
        }
    }
}

/// Equipment (supply) vs. envelope (demand) component of a split-load end use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Load {
    Supply,
    Demand,
}

impl Load {
    pub fn as_str(self) -> &'static str {
        match self {
            Load::Supply => "supply",
            Load::Demand => "demand",
        }
    }
}

/// Structure vintage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vintage {
    New,
    Existing,
}

impl Vintage {
    pub const ALL: [Vintage; 2] = [Vintage::New, Vintage::Existing];

    pub fn as_str(self) -> &'static str {
        match self {
            Vintage::New => "new",
            Vintage::Existing => "existing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Vintage::New),
            "existing" => Some(Vintage::Existing),
            _ => None,
        }
    }
}

/// Building sector, derived from the building type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    Residential,
    Commercial,
}

impl Sector {
    pub fn as_str(self) -> &'static str {
        match self {
            Sector::Residential => "residential",
            Sector::Commercial => "commercial",
        }
    }

    /// Building-class label used in output breakdowns, e.g. `"Residential (New)"`.
    pub fn class_label(self, vintage: Vintage) -> String {
        let sector = match self {
            Sector::Residential => "Residential",
            Sector::Commercial => "Commercial",
        };
        let vintage = match vintage {
            Vintage::New => "New",
            Vintage::Existing => "Existing",
        };
        format!("{sector} ({vintage})")
    }
}

/// Ordered identity of one baseline microsegment.
///
/// Displays (and serializes) as a tuple string such as
/// `('primary', 'AIA_CZ1', 'single family home', 'electricity', 'water heating', 'electric WH', 'new')`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyChain {
    pub segment: Segment,
    pub region: String,
    pub bldg_type: String,
    pub fuel: String,
    pub end_use: String,
    pub load: Option<Load>,
    pub technology: Option<String>,
    pub vintage: Vintage,
}

impl KeyChain {
    /// Key of the cost/performance/lifetime record, which does not vary by vintage.
    pub fn cpl_key(&self) -> String {
        let mut parts = vec![
            self.region.as_str(),
            self.bldg_type.as_str(),
            self.fuel.as_str(),
            self.end_use.as_str(),
        ];
        if let Some(load) = self.load {
            parts.push(load.as_str());
        }
        parts.push(self.technology.as_deref().unwrap_or("None"));
        parts.join("|")
    }

    /// `(region, bldg_type, vintage)` grouping used to couple secondary
    /// microsegments to the measure's primary microsegments.
    pub fn building_group(&self) -> String {
        format!("{}|{}|{}", self.region, self.bldg_type, self.vintage.as_str())
    }
}

impl fmt::Display for KeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "('{}', '{}', '{}', '{}', '{}', ",
            self.segment.as_str(),
            self.region,
            self.bldg_type,
            self.fuel,
            self.end_use
        )?;
        if let Some(load) = self.load {
            write!(f, "'{}', ", load.as_str())?;
        }
        match &self.technology {
            Some(t) => write!(f, "'{t}', ")?,
            None => write!(f, "None, ")?,
        }
        write!(f, "'{}')", self.vintage.as_str())
    }
}

impl Serialize for KeyChain {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wh_key() -> KeyChain {
        KeyChain {
            segment: Segment::Primary,
            region: "AIA_CZ1".into(),
            bldg_type: "single family home".into(),
            fuel: "electricity".into(),
            end_use: "water heating".into(),
            load: None,
            technology: Some("electric WH".into()),
            vintage: Vintage::New,
        }
    }

    #[test]
    fn display_matches_tuple_form() {
        assert_eq!(
            wh_key().to_string(),
            "('primary', 'AIA_CZ1', 'single family home', 'electricity', 'water heating', 'electric WH', 'new')"
        );
    }

    #[test]
    fn display_includes_load_and_none_technology() {
        let k = KeyChain {
            segment: Segment::Secondary,
            end_use: "heating".into(),
            load: Some(Load::Demand),
            technology: None,
            vintage: Vintage::Existing,
            ..wh_key()
        };
        assert_eq!(
            k.to_string(),
            "('secondary', 'AIA_CZ1', 'single family home', 'electricity', 'heating', 'demand', None, 'existing')"
        );
    }

    #[test]
    fn cpl_key_ignores_vintage() {
        let a = wh_key();
        let b = KeyChain {
            vintage: Vintage::Existing,
            ..wh_key()
        };
        assert_eq!(a.cpl_key(), b.cpl_key());
        assert_ne!(a, b);
    }

    #[test]
    fn class_label() {
        assert_eq!(
            Sector::Commercial.class_label(Vintage::Existing),
            "Commercial (Existing)"
        );
    }
}
