//! Row types for every backend table, plus the draft payloads the editors
//! submit. Field names match the backend columns.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// ============================================================================
// Shops & branches
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShopType {
    #[default]
    Restaurant,
    Cafe,
    Bakery,
    Buffet,
    /// Enables barcode lookup and stock decrement on sale.
    Retail,
}

impl ShopType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Restaurant => "restaurant",
            Self::Cafe => "cafe",
            Self::Bakery => "bakery",
            Self::Buffet => "buffet",
            Self::Retail => "retail",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shop {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub slug: String,
    pub shop_type: ShopType,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Provider-specific fields, e.g. `promptpay_id`.
    #[serde(default)]
    pub settings: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Shop {
    pub fn is_retail(&self) -> bool {
        self.shop_type == ShopType::Retail
    }

    pub fn promptpay_id(&self) -> Option<&str> {
        self.settings
            .get("promptpay_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewShop {
    pub name: String,
    pub slug: String,
    pub shop_type: ShopType,
}

/// Editable shop profile fields (settings page).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShopUpdate {
    pub name: String,
    pub shop_type: ShopType,
    pub phone: Option<String>,
    pub address: Option<String>,
    /// Merged over the existing settings map, never replacing it wholesale.
    pub settings: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Branch {
    pub id: String,
    pub shop_id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub table_count: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BranchDraft {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub table_count: u32,
}

impl Default for BranchDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: None,
            phone: None,
            table_count: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiningTable {
    pub id: String,
    pub branch_id: String,
    pub table_number: String,
    #[serde(default)]
    pub seats: u32,
    #[serde(default)]
    pub status: String,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Menu
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: String,
    pub shop_id: String,
    pub name: String,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryDraft {
    pub name: String,
    pub sort_order: i32,
    pub is_active: bool,
}

impl Default for CategoryDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            sort_order: 0,
            is_active: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MenuItem {
    pub id: String,
    pub shop_id: String,
    /// May point at a deleted category; render as uncategorized.
    #[serde(default)]
    pub category_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub options: Vec<Value>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub track_stock: bool,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MenuItemDraft {
    pub category_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub image_url: Option<String>,
    pub is_available: bool,
    pub barcode: Option<String>,
    pub track_stock: bool,
    pub stock_quantity: Option<i64>,
}

impl Default for MenuItemDraft {
    fn default() -> Self {
        Self {
            category_id: None,
            name: String::new(),
            description: None,
            price: Decimal::ZERO,
            image_url: None,
            is_available: true,
            barcode: None,
            track_stock: false,
            stock_quantity: None,
        }
    }
}

// ============================================================================
// Orders
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    #[default]
    DineIn,
    Takeaway,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DineIn => "dine_in",
            Self::Takeaway => "takeaway",
        }
    }
}

/// Order lifecycle. Forward chain is
/// `pending -> preparing -> ready -> served -> paid`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Preparing,
    Ready,
    Served,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        Self::Pending,
        Self::Preparing,
        Self::Ready,
        Self::Served,
        Self::Paid,
        Self::Cancelled,
    ];

    /// The single status an operator may advance to, if any.
    pub fn next(&self) -> Option<OrderStatus> {
        match self {
            Self::Pending => Some(Self::Preparing),
            Self::Preparing => Some(Self::Ready),
            Self::Ready => Some(Self::Served),
            Self::Served => Some(Self::Paid),
            Self::Paid | Self::Cancelled => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Served => "served",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    /// PromptPay bank transfer, acknowledged manually.
    Transfer,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Transfer => "transfer",
            Self::Card => "card",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub branch_id: String,
    #[serde(default)]
    pub table_id: Option<String>,
    pub order_number: i64,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub menu_item_id: String,
    pub item_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub options: Map<String, Value>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

// ============================================================================
// Accounts & inquiries
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPlan {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub plan: String,
    pub max_shops: u32,
    pub max_branches: u32,
    pub max_menu_items: u32,
    #[serde(default)]
    pub features: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContactInquiry {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}
