//! Shop domain entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A shop as stored upstream and cached under `cache:shop:{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    /// `None` only on payloads that have not been persisted.
    pub id: Option<u64>,
    pub name: String,
    pub type_id: u64,
    /// Comma-separated image URLs.
    #[serde(default)]
    pub images: String,
    #[serde(default)]
    pub area: Option<String>,
    pub address: String,
    /// Longitude.
    pub x: f64,
    /// Latitude.
    pub y: f64,
    /// Average price in cents.
    #[serde(default)]
    pub avg_price: Option<u64>,
    #[serde(default)]
    pub sold: u32,
    #[serde(default)]
    pub comments: u32,
    /// Rating times ten, 0 to 50.
    #[serde(default)]
    pub score: u8,
    #[serde(default)]
    pub open_hours: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Shop {
    /// A minimal shop with `id` and `name`; remaining fields are placeholders.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            type_id: 1,
            images: String::new(),
            area: None,
            address: String::new(),
            x: 0.0,
            y: 0.0,
            avg_price: None,
            sold: 0,
            comments: 0,
            score: 0,
            open_hours: None,
            updated_at: None,
        }
    }
}

/// A shop category, listed in ascending `sort` order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopType {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub icon: String,
    pub sort: i32,
}

impl ShopType {
    pub fn new(id: u64, name: impl Into<String>, sort: i32) -> Self {
        Self {
            id,
            name: name.into(),
            icon: String::new(),
            sort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shop_json_uses_camel_case() {
        let mut shop = Shop::new(42, "Shop42");
        shop.avg_price = Some(8_000);
        shop.open_hours = Some("10:00-22:00".to_string());

        let json = serde_json::to_value(&shop).unwrap();
        assert_eq!(json["typeId"], 1);
        assert_eq!(json["avgPrice"], 8_000);
        assert_eq!(json["openHours"], "10:00-22:00");
    }

    #[test]
    fn test_shop_defaults_optional_fields() {
        let shop: Shop = serde_json::from_str(
            r#"{"id":7,"name":"Tea House","typeId":2,"address":"1 Main St","x":120.1,"y":30.2}"#,
        )
        .unwrap();
        assert_eq!(shop.id, Some(7));
        assert_eq!(shop.sold, 0);
        assert!(shop.updated_at.is_none());
    }
}
