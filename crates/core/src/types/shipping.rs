//! Shipping geography: regions (provinces) and their cities.

use serde::{Deserialize, Serialize};

use super::id::{CityId, RegionId};
use super::price::Price;

/// A city with its flat shipping charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingCity {
    #[serde(default, alias = "_id")]
    pub id: Option<CityId>,
    pub name: String,
    /// Whole rupees.
    pub shipping_charge: u32,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl ShippingCity {
    /// The charge as a [`Price`].
    #[must_use]
    pub fn charge(&self) -> Price {
        Price::from_whole(self.shipping_charge)
    }
}

/// A shipping region (province) and the cities it serves.
///
/// City names are unique within a region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingRegion {
    #[serde(alias = "_id")]
    pub id: RegionId,
    pub name: String,
    #[serde(default)]
    pub cities: Vec<ShippingCity>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl ShippingRegion {
    /// Find a city by exact name.
    #[must_use]
    pub fn city(&self, name: &str) -> Option<&ShippingCity> {
        self.cities.iter().find(|city| city.name == name)
    }

    /// Cities that can currently be selected.
    pub fn active_cities(&self) -> impl Iterator<Item = &ShippingCity> {
        self.cities.iter().filter(|city| city.is_active)
    }
}

const fn default_active() -> bool {
    true
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deserializes_backend_shape() {
        let json = r#"{"_id":"r1","name":"Bagmati","cities":[{"name":"Kathmandu","shippingCharge":100,"isActive":true},{"_id":"c2","name":"Lalitpur","shippingCharge":120}],"isActive":true}"#;
        let region: ShippingRegion = serde_json::from_str(json).unwrap();
        assert_eq!(region.id.as_str(), "r1");
        assert_eq!(region.cities.len(), 2);
        assert!(region.cities[1].is_active);
        assert_eq!(region.city("Kathmandu").unwrap().charge(), Price::from_whole(100));
        assert!(region.city("Pokhara").is_none());
    }

    #[test]
    fn test_active_cities_filters_inactive() {
        let region = ShippingRegion {
            id: RegionId::new("r1"),
            name: "Gandaki".to_string(),
            cities: vec![
                ShippingCity {
                    id: None,
                    name: "Pokhara".to_string(),
                    shipping_charge: 150,
                    is_active: true,
                },
                ShippingCity {
                    id: None,
                    name: "Baglung".to_string(),
                    shipping_charge: 200,
                    is_active: false,
                },
            ],
            is_active: true,
        };
        let names: Vec<_> = region.active_cities().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Pokhara"]);
    }
}
