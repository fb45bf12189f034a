use super::space::FixedSet;
use super::types::ParamName;
use crate::error::DesignError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dielectric substrates the design shell offers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Substrate {
    Fr4,
    Rogers4350,
    Rogers5880,
    TaconicTly,
}

impl Substrate {
    pub const ALL: [Substrate; 4] = [
        Self::Fr4,
        Self::Rogers4350,
        Self::Rogers5880,
        Self::TaconicTly,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Fr4 => "FR-4 (lossy)",
            Self::Rogers4350 => "Rogers4350",
            Self::Rogers5880 => "Rogers5880",
            Self::TaconicTly => "TaconicTLY",
        }
    }

    /// Relative permittivity.
    pub const fn eps_r(self) -> f64 {
        match self {
            Self::Fr4 => 4.4,
            Self::Rogers4350 => 3.66,
            Self::Rogers5880 => 2.2,
            Self::TaconicTly => 2.2,
        }
    }

    /// Thickness in meters.
    pub const fn thickness(self) -> f64 {
        match self {
            Self::Fr4 => 0.0016,
            Self::Rogers4350 => 0.001524,
            Self::Rogers5880 => 0.00157,
            Self::TaconicTly => 0.0015,
        }
    }

    /// The parameters a substrate choice pins down.
    pub fn fixed_set(self) -> FixedSet {
        FixedSet::new()
            .with(ParamName::EpsR, self.eps_r())
            .with(ParamName::SubstrateH, self.thickness())
    }
}

impl fmt::Display for Substrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Substrate {
    type Err = DesignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "fr4" | "fr4lossy" => Ok(Self::Fr4),
            "rogers4350" | "ro4350" | "rogers4350b" => Ok(Self::Rogers4350),
            "rogers5880" | "rogersrtduroid5880" | "rogersrtduroid5880lossy" | "duroid" => {
                Ok(Self::Rogers5880)
            }
            "taconictly" | "taconic" | "taconictly3" | "taconictly3lossy" => Ok(Self::TaconicTly),
            _ => Err(DesignError::invalid("substrate", format!("unknown substrate '{}'", s))),
        }
    }
}
