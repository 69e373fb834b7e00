//! Relation vocabulary shared by scene-graph construction and the model.

use crate::core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Closed set of spatial/semantic relations between actors.
///
/// Discriminants are the relation ids stored in edge attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Relation {
    IsIn = 0,
    NearColl = 1,
    SuperNear = 2,
    VeryNear = 3,
    Near = 4,
    Visible = 5,
    InDFrontOf = 6,
    InSFrontOf = 7,
    AtDRearOf = 8,
    AtSRearOf = 9,
    ToLeftOf = 10,
    ToRightOf = 11,
}

impl Relation {
    /// All relations in discriminant order.
    pub const ALL: [Relation; 12] = [
        Relation::IsIn,
        Relation::NearColl,
        Relation::SuperNear,
        Relation::VeryNear,
        Relation::Near,
        Relation::Visible,
        Relation::InDFrontOf,
        Relation::InSFrontOf,
        Relation::AtDRearOf,
        Relation::AtSRearOf,
        Relation::ToLeftOf,
        Relation::ToRightOf,
    ];

    /// Number of relation types the model must embed (max id + 1).
    pub const COUNT: usize = Relation::ToRightOf as usize + 1;

    /// Relation id as stored in edge attributes.
    pub fn id(&self) -> usize {
        *self as usize
    }

    /// Look up a relation by id.
    pub fn from_id(id: usize) -> Option<Self> {
        Self::ALL.get(id).copied()
    }

    /// Name used by the scene-graph producer.
    pub fn name(&self) -> &'static str {
        match self {
            Relation::IsIn => "isIn",
            Relation::NearColl => "near_coll",
            Relation::SuperNear => "super_near",
            Relation::VeryNear => "very_near",
            Relation::Near => "near",
            Relation::Visible => "visible",
            Relation::InDFrontOf => "inDFrontOf",
            Relation::InSFrontOf => "inSFrontOf",
            Relation::AtDRearOf => "atDRearOf",
            Relation::AtSRearOf => "atSRearOf",
            Relation::ToLeftOf => "toLeftOf",
            Relation::ToRightOf => "toRightOf",
        }
    }
}

impl FromStr for Relation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|r| r.name() == s)
            .copied()
            .ok_or_else(|| Error::InvalidDataset(format!("unknown relation: {}", s)))
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
