use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// One market export row waiting to be decomposed into catalog entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StagingRecord {
    pub id: i64,
    pub market_name: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    /// Pipe-delimited category names; empty when no flag was set.
    pub categories: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeSummary {
    pub states: usize,
    pub cities: usize,
    pub markets: usize,
    pub links: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub rows: usize,
    pub categories: usize,
    pub normalized: NormalizeSummary,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub id: i64,
    pub name: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub rating: i64,
    pub content: Option<String>,
    pub created_at: i64,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDetail {
    pub id: i64,
    pub name: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub categories: Vec<String>,
    pub reviews: Vec<ReviewRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub fn offset(&self) -> i64 {
        i64::from(self.number) * i64::from(self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReview {
    pub first_name: String,
    pub last_name: String,
    pub rating: Rating,
    pub content: Option<String>,
}

/// Review score, always within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 5;

    pub fn value(self) -> i64 {
        i64::from(self.0)
    }
}

impl TryFrom<i64> for Rating {
    type Error = crate::error::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Rating(value as u8))
        } else {
            Err(crate::error::Error::InvalidRating(value.to_string()))
        }
    }
}

impl From<Rating> for i64 {
    fn from(rating: Rating) -> Self {
        rating.value()
    }
}

impl std::str::FromStr for Rating {
    type Err = crate::error::Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let value: i64 = input
            .trim()
            .parse()
            .map_err(|_| crate::error::Error::InvalidRating(input.to_string()))?;
        Rating::try_from(value).map_err(|_| crate::error::Error::InvalidRating(input.to_string()))
    }
}
