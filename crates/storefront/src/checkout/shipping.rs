//! Shipping rate resolution: province, then city, then flat charge.
//!
//! Lookups run over the region list fetched once per page load; nothing here
//! touches the network.

use himal_core::{Price, ShippingCity, ShippingRegion};

/// Find an active region by name.
#[must_use]
pub fn find_region<'a>(regions: &'a [ShippingRegion], name: &str) -> Option<&'a ShippingRegion> {
    regions
        .iter()
        .find(|region| region.is_active && region.name == name)
}

/// Cities offered for the named region. Unknown or inactive regions offer
/// none.
#[must_use]
pub fn select_region<'a>(regions: &'a [ShippingRegion], name: &str) -> Vec<&'a ShippingCity> {
    find_region(regions, name)
        .map(|region| region.active_cities().collect())
        .unwrap_or_default()
}

/// Flat charge for a city of `region`, if it is offered.
#[must_use]
pub fn select_city(region: &ShippingRegion, city_name: &str) -> Option<Price> {
    region
        .city(city_name)
        .filter(|city| city.is_active)
        .map(ShippingCity::charge)
}

/// The customer's current province/city choice and the charge it implies.
///
/// Changing the region always clears the city and zeroes the charge; the
/// charge only becomes non-zero once a city of that region is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShippingSelection {
    region: Option<String>,
    city: Option<String>,
    charge: Price,
}

impl ShippingSelection {
    /// Switch to `name`. Returns false when the region is not offered, in
    /// which case nothing stays selected.
    pub fn choose_region(&mut self, regions: &[ShippingRegion], name: &str) -> bool {
        self.city = None;
        self.charge = Price::ZERO;
        self.region = find_region(regions, name).map(|region| region.name.clone());
        self.region.is_some()
    }

    /// Pick a city of the current region. Returns false (and clears the city)
    /// when it is not offered there.
    pub fn choose_city(&mut self, regions: &[ShippingRegion], name: &str) -> bool {
        let charge = self
            .region
            .as_deref()
            .and_then(|region| find_region(regions, region))
            .and_then(|region| select_city(region, name));

        match charge {
            Some(charge) => {
                self.city = Some(name.to_owned());
                self.charge = charge;
                true
            }
            None => {
                self.city = None;
                self.charge = Price::ZERO;
                false
            }
        }
    }

    #[must_use]
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    #[must_use]
    pub fn city(&self) -> Option<&str> {
        self.city.as_deref()
    }

    /// Shipping charge; zero until a city is chosen.
    #[must_use]
    pub const fn charge(&self) -> Price {
        self.charge
    }

    /// True once a city (and therefore a charge) is known.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.city.is_some()
    }
}
