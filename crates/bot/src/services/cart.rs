//! In-memory carts keyed by customer.
//!
//! Reads and writes of the map are memory-safe, but nothing serializes a
//! cart update against a checkout for the same customer: whichever finishes
//! last wins.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use bakery_orders_core::{CartUpdateItem, CustomerId};

/// Product id to quantity.
pub type Cart = HashMap<String, u32>;

/// Owned map of customer carts.
#[derive(Debug, Clone, Default)]
pub struct CartStore {
    carts: Arc<RwLock<HashMap<CustomerId, Cart>>>,
}

impl CartStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the customer's cart with the given lines.
    ///
    /// Lines without an id or with a quantity of zero or less are dropped.
    /// Returns the number of units now in the cart.
    pub fn replace(&self, customer: CustomerId, items: &[CartUpdateItem]) -> u64 {
        let mut cart = Cart::new();
        for item in items {
            let Some(id) = item.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) else {
                continue;
            };
            let Some(quantity) = item
                .quantity
                .filter(|q| *q > 0)
                .and_then(|q| u32::try_from(q).ok())
            else {
                continue;
            };
            cart.insert(id.to_string(), quantity);
        }

        let count = unit_count(&cart);
        let mut carts = self.carts.write().unwrap_or_else(PoisonError::into_inner);
        if cart.is_empty() {
            carts.remove(&customer);
        } else {
            carts.insert(customer, cart);
        }
        count
    }

    /// Copy of the customer's cart; empty when there is none.
    #[must_use]
    pub fn get(&self, customer: CustomerId) -> Cart {
        self.carts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&customer)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop the customer's cart.
    pub fn clear(&self, customer: CustomerId) {
        self.carts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&customer);
    }

    /// Units in the customer's cart.
    #[must_use]
    pub fn item_count(&self, customer: CustomerId) -> u64 {
        self.carts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&customer)
            .map_or(0, unit_count)
    }
}

fn unit_count(cart: &Cart) -> u64 {
    cart.values().map(|q| u64::from(*q)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: &str, quantity: i64) -> CartUpdateItem {
        CartUpdateItem {
            id: Some(id.to_string()),
            quantity: Some(quantity),
        }
    }

    #[test]
    fn test_replace_drops_non_positive_lines() {
        let carts = CartStore::new();
        let customer = CustomerId::new(1);

        let count = carts.replace(customer, &[line("b1", 2), line("c3", 0), line("d4", -1)]);

        assert_eq!(count, 2);
        assert_eq!(carts.get(customer).len(), 1);
        assert_eq!(carts.item_count(customer), 2);
    }

    #[test]
    fn test_replace_overwrites_previous_cart() {
        let carts = CartStore::new();
        let customer = CustomerId::new(1);
        carts.replace(customer, &[line("b1", 2), line("b2", 1)]);

        carts.replace(customer, &[line("b2", 5)]);

        let cart = carts.get(customer);
        assert_eq!(cart.get("b2"), Some(&5));
        assert!(!cart.contains_key("b1"));
    }

    #[test]
    fn test_clear_only_affects_one_customer() {
        let carts = CartStore::new();
        carts.replace(CustomerId::new(1), &[line("b1", 1)]);
        carts.replace(CustomerId::new(2), &[line("b1", 3)]);

        carts.clear(CustomerId::new(1));

        assert_eq!(carts.item_count(CustomerId::new(1)), 0);
        assert_eq!(carts.item_count(CustomerId::new(2)), 3);
    }
}
