//! Translation tables and lookup.
//!
//! Lookup order: the selected language, then Thai, then the raw key.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Th,
    En,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Th => "th",
            Self::En => "en",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "th" => Some(Self::Th),
            "en" => Some(Self::En),
            _ => None,
        }
    }

    fn table(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Th => TH,
            Self::En => EN,
        }
    }
}

fn lookup(table: &'static [(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Resolve a display string.
pub fn t<'a>(language: Language, key: &'a str) -> &'a str {
    lookup(language.table(), key)
        .or_else(|| lookup(TH, key))
        .unwrap_or(key)
}

static TH: &[(&str, &str)] = &[
    ("nav.dashboard", "แดชบอร์ด"),
    ("nav.pos", "ขายหน้าร้าน"),
    ("nav.menu", "เมนู"),
    ("nav.orders", "ออเดอร์"),
    ("nav.branches", "สาขา"),
    ("nav.settings", "ตั้งค่า"),
    ("nav.admin", "ผู้ดูแลระบบ"),
    ("nav.login", "เข้าสู่ระบบ"),
    ("nav.logout", "ออกจากระบบ"),
    ("nav.register", "สมัครสมาชิก"),
    ("nav.contact", "ติดต่อเรา"),
    ("common.save", "บันทึก"),
    ("common.delete", "ลบ"),
    ("common.back", "กลับ"),
    ("common.loading", "กำลังโหลด..."),
    ("auth.email", "อีเมล"),
    ("auth.password", "รหัสผ่าน"),
    ("auth.fullName", "ชื่อ-นามสกุล"),
    ("auth.login", "เข้าสู่ระบบ"),
    ("auth.register", "สมัครสมาชิก"),
    ("auth.error.login", "อีเมลหรือรหัสผ่านไม่ถูกต้อง"),
    ("auth.error.register", "สมัครสมาชิกไม่สำเร็จ"),
    ("auth.success.register", "สมัครสมาชิกสำเร็จ"),
    ("dashboard.title", "แดชบอร์ด"),
    ("dashboard.noShop", "ยังไม่มีร้านค้า"),
    ("dashboard.createShop", "สร้างร้านค้า"),
    ("dashboard.shopName", "ชื่อร้าน"),
    ("dashboard.shopSlug", "ลิงก์ร้าน"),
    ("dashboard.shopType", "ประเภทร้าน"),
    ("dashboard.todaySales", "ยอดขายวันนี้"),
    ("dashboard.todayOrders", "ออเดอร์วันนี้"),
    ("dashboard.popularItems", "เมนูขายดี"),
    ("dashboard.recentOrders", "ออเดอร์ล่าสุด"),
    ("shop.type.restaurant", "ร้านอาหาร"),
    ("shop.type.cafe", "คาเฟ่"),
    ("shop.type.bakery", "เบเกอรี่"),
    ("shop.type.buffet", "บุฟเฟ่ต์"),
    ("shop.type.retail", "ร้านค้าปลีก"),
    ("menu.title", "จัดการเมนู"),
    ("menu.addCategory", "เพิ่มหมวดหมู่"),
    ("menu.addItem", "เพิ่มเมนู"),
    ("menu.editItem", "แก้ไขเมนู"),
    ("menu.itemName", "ชื่อเมนู"),
    ("menu.price", "ราคา"),
    ("menu.category", "หมวดหมู่"),
    ("menu.uncategorized", "ไม่มีหมวดหมู่"),
    ("menu.available", "พร้อมขาย"),
    ("menu.unavailable", "หมด"),
    ("menu.noItems", "ยังไม่มีเมนู"),
    ("menu.confirmDelete", "ยืนยันการลบ?"),
    ("pos.search", "ค้นหาเมนู..."),
    ("pos.allCategories", "ทั้งหมด"),
    ("pos.cart", "ตะกร้า"),
    ("pos.emptyCart", "ยังไม่มีรายการ"),
    ("pos.dineIn", "ทานที่ร้าน"),
    ("pos.takeaway", "กลับบ้าน"),
    ("pos.selectTable", "เลือกโต๊ะ"),
    ("pos.subtotal", "ยอดรวม"),
    ("pos.discount", "ส่วนลด"),
    ("pos.total", "ยอดสุทธิ"),
    ("pos.note", "หมายเหตุ"),
    ("pos.pay", "ชำระเงิน"),
    ("pos.cash", "เงินสด"),
    ("pos.transfer", "โอนเงิน"),
    ("pos.card", "บัตร"),
    ("pos.received", "รับเงิน"),
    ("pos.change", "เงินทอน"),
    ("pos.barcodeNotFound", "ไม่พบสินค้าจากบาร์โค้ดนี้"),
    ("orders.title", "ออเดอร์"),
    ("orders.all", "ทั้งหมด"),
    ("orders.pending", "รอดำเนินการ"),
    ("orders.preparing", "กำลังทำ"),
    ("orders.ready", "พร้อมเสิร์ฟ"),
    ("orders.served", "เสิร์ฟแล้ว"),
    ("orders.paid", "ชำระแล้ว"),
    ("orders.cancelled", "ยกเลิก"),
    ("orders.noOrders", "ยังไม่มีออเดอร์"),
    ("orders.updateStatus", "อัปเดตสถานะ"),
    ("branch.title", "จัดการสาขา"),
    ("branch.add", "เพิ่มสาขา"),
    ("branch.edit", "แก้ไขสาขา"),
    ("branch.name", "ชื่อสาขา"),
    ("branch.tableCount", "จำนวนโต๊ะ"),
    ("branch.generateTables", "สร้างโต๊ะ"),
    ("branch.qrCode", "QR Code"),
    ("branch.noBranches", "ยังไม่มีสาขา"),
    ("public.addToCart", "ใส่ตะกร้า"),
    ("public.placeOrder", "สั่งอาหาร"),
    ("public.orderPlaced", "สั่งอาหารเรียบร้อยแล้ว"),
    ("public.tableNumber", "โต๊ะ"),
    ("public.yourName", "ชื่อของคุณ"),
    ("public.shopNotFound", "ไม่พบร้านค้า"),
    ("contact.title", "ติดต่อเรา"),
    ("contact.form.submit", "ส่งข้อความ"),
    ("contact.form.success", "ส่งข้อความเรียบร้อยแล้ว"),
    ("contact.form.error", "ส่งข้อความไม่สำเร็จ กรุณาลองใหม่"),
    ("contact.lineId", "LINE ID"),
    ("admin.title", "ผู้ดูแลระบบ"),
    ("admin.stats", "สถิติ"),
    ("admin.inquiries", "ข้อความติดต่อ"),
    ("admin.noInquiries", "ยังไม่มีข้อความ"),
    ("admin.markRead", "อ่านแล้ว"),
    ("admin.totalUsers", "ผู้ใช้ทั้งหมด"),
    ("admin.totalShops", "ร้านค้าทั้งหมด"),
    ("admin.totalOrders", "ออเดอร์ทั้งหมด"),
    ("plan.limitReached", "แพ็กเกจของคุณถึงขีดจำกัดแล้ว"),
];

static EN: &[(&str, &str)] = &[
    ("nav.dashboard", "Dashboard"),
    ("nav.pos", "POS"),
    ("nav.menu", "Menu"),
    ("nav.orders", "Orders"),
    ("nav.branches", "Branches"),
    ("nav.settings", "Settings"),
    ("nav.admin", "Admin"),
    ("nav.login", "Log in"),
    ("nav.logout", "Log out"),
    ("nav.register", "Sign up"),
    ("nav.contact", "Contact"),
    ("common.save", "Save"),
    ("common.delete", "Delete"),
    ("common.back", "Back"),
    ("common.loading", "Loading..."),
    ("auth.email", "Email"),
    ("auth.password", "Password"),
    ("auth.fullName", "Full name"),
    ("auth.login", "Log in"),
    ("auth.register", "Sign up"),
    ("auth.error.login", "Invalid email or password"),
    ("auth.error.register", "Sign up failed"),
    ("auth.success.register", "Account created"),
    ("dashboard.title", "Dashboard"),
    ("dashboard.noShop", "No shop yet"),
    ("dashboard.createShop", "Create shop"),
    ("dashboard.shopName", "Shop name"),
    ("dashboard.shopSlug", "Shop link"),
    ("dashboard.shopType", "Shop type"),
    ("dashboard.todaySales", "Today's sales"),
    ("dashboard.todayOrders", "Today's orders"),
    ("dashboard.popularItems", "Popular items"),
    ("dashboard.recentOrders", "Recent orders"),
    ("shop.type.restaurant", "Restaurant"),
    ("shop.type.cafe", "Cafe"),
    ("shop.type.bakery", "Bakery"),
    ("shop.type.buffet", "Buffet"),
    ("shop.type.retail", "Retail"),
    ("menu.title", "Menu"),
    ("menu.addCategory", "Add category"),
    ("menu.addItem", "Add item"),
    ("menu.editItem", "Edit item"),
    ("menu.itemName", "Item name"),
    ("menu.price", "Price"),
    ("menu.category", "Category"),
    ("menu.uncategorized", "Uncategorized"),
    ("menu.available", "Available"),
    ("menu.unavailable", "Sold out"),
    ("menu.noItems", "No items yet"),
    ("menu.confirmDelete", "Delete this?"),
    ("pos.search", "Search menu..."),
    ("pos.allCategories", "All"),
    ("pos.cart", "Cart"),
    ("pos.emptyCart", "Cart is empty"),
    ("pos.dineIn", "Dine in"),
    ("pos.takeaway", "Takeaway"),
    ("pos.selectTable", "Select table"),
    ("pos.subtotal", "Subtotal"),
    ("pos.discount", "Discount"),
    ("pos.total", "Total"),
    ("pos.note", "Note"),
    ("pos.pay", "Pay"),
    ("pos.cash", "Cash"),
    ("pos.transfer", "Transfer"),
    ("pos.card", "Card"),
    ("pos.received", "Received"),
    ("pos.change", "Change"),
    ("pos.barcodeNotFound", "No product matches this barcode"),
    ("orders.title", "Orders"),
    ("orders.all", "All"),
    ("orders.pending", "Pending"),
    ("orders.preparing", "Preparing"),
    ("orders.ready", "Ready"),
    ("orders.served", "Served"),
    ("orders.paid", "Paid"),
    ("orders.cancelled", "Cancelled"),
    ("orders.noOrders", "No orders yet"),
    ("orders.updateStatus", "Update status"),
    ("branch.title", "Branches"),
    ("branch.add", "Add branch"),
    ("branch.edit", "Edit branch"),
    ("branch.name", "Branch name"),
    ("branch.tableCount", "Tables"),
    ("branch.generateTables", "Generate tables"),
    ("branch.qrCode", "QR Code"),
    ("branch.noBranches", "No branches yet"),
    ("public.addToCart", "Add to cart"),
    ("public.placeOrder", "Place order"),
    ("public.orderPlaced", "Your order has been placed"),
    ("public.tableNumber", "Table"),
    ("public.yourName", "Your name"),
    ("public.shopNotFound", "Shop not found"),
    ("contact.title", "Contact us"),
    ("contact.form.submit", "Send"),
    ("contact.form.success", "Message sent"),
    ("contact.form.error", "Could not send your message. Please try again."),
    ("admin.title", "Admin"),
    ("admin.stats", "Statistics"),
    ("admin.inquiries", "Inquiries"),
    ("admin.noInquiries", "No inquiries"),
    ("admin.markRead", "Mark as read"),
    ("admin.totalUsers", "Total users"),
    ("admin.totalShops", "Total shops"),
    ("admin.totalOrders", "Total orders"),
    ("plan.limitReached", "Your plan limit has been reached"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn resolves_selected_language() {
        assert_eq!(t(Language::En, "pos.total"), "Total");
        assert_eq!(t(Language::Th, "pos.total"), "ยอดสุทธิ");
    }

    #[test]
    fn falls_back_to_thai_then_key() {
        assert_eq!(t(Language::En, "contact.lineId"), "LINE ID");
        assert_eq!(t(Language::En, "no.such.key"), "no.such.key");
    }

    #[test]
    fn english_keys_are_a_subset_of_thai() {
        let th: HashSet<&str> = TH.iter().map(|(k, _)| *k).collect();
        for (key, _) in EN {
            assert!(th.contains(key), "{key} missing from Thai table");
        }
    }

    #[test]
    fn parses_language_codes() {
        assert_eq!(Language::parse("EN"), Some(Language::En));
        assert_eq!(Language::parse("jp"), None);
        assert_eq!(Language::default(), Language::Th);
    }
}
