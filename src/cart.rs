//! In-memory cart for one checkout session.
//!
//! Lines snapshot the item's name and price when added; catalog edits made
//! afterwards do not touch them. No line ever holds a quantity of zero.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{PosError, PosResult};
use crate::models::MenuItem;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartItem {
    pub menu_item_id: String,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl CartItem {
    pub fn from_menu_item(item: &MenuItem, quantity: u32, note: &str) -> Self {
        Self {
            menu_item_id: item.id.clone(),
            name: item.name.clone(),
            price: item.price,
            quantity,
            note: note.trim().to_string(),
            options: Map::new(),
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// How `add` decides two lines are the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeRule {
    /// Cashier cart: same item with a different note is a separate line.
    #[default]
    ItemAndNote,
    /// Customer cart on the public page: one line per item.
    Item,
}

/// Money summary for a cart and a discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

/// Reject discounts outside `0..=subtotal`.
pub fn compute_totals(subtotal: Decimal, discount: Decimal) -> PosResult<Totals> {
    if discount.is_sign_negative() && !discount.is_zero() {
        return Err(PosError::validation("Discount cannot be negative"));
    }
    if discount > subtotal {
        return Err(PosError::validation("Discount cannot exceed the subtotal"));
    }
    Ok(Totals {
        subtotal,
        discount,
        total: subtotal - discount,
    })
}

#[derive(Debug, Clone, Default)]
pub struct Cart {
    items: Vec<CartItem>,
    rule: MergeRule,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(rule: MergeRule) -> Self {
        Self {
            items: Vec::new(),
            rule,
        }
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Merge into a matching line or append. Zero-quantity adds are ignored.
    pub fn add(&mut self, item: CartItem) {
        if item.quantity == 0 {
            return;
        }
        let rule = self.rule;
        let existing = self.items.iter_mut().find(|line| {
            line.menu_item_id == item.menu_item_id
                && (rule == MergeRule::Item || line.note == item.note)
        });
        match existing {
            Some(line) => line.quantity = line.quantity.saturating_add(item.quantity),
            None => self.items.push(item),
        }
    }

    /// Set a line's quantity; zero or less removes the line.
    pub fn set_quantity(&mut self, index: usize, quantity: i64) {
        if index >= self.items.len() {
            return;
        }
        if quantity <= 0 {
            self.items.remove(index);
        } else {
            self.items[index].quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        }
    }

    pub fn set_note(&mut self, index: usize, note: &str) {
        if let Some(line) = self.items.get_mut(index) {
            line.note = note.trim().to_string();
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<CartItem> {
        (index < self.items.len()).then(|| self.items.remove(index))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn total_quantity(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    pub fn totals(&self, discount: Decimal) -> PosResult<Totals> {
        compute_totals(self.subtotal(), discount)
    }
}
