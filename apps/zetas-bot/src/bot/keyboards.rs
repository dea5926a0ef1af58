use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

fn button(text: &str, data: &str) -> Vec<InlineKeyboardButton> {
    vec![InlineKeyboardButton::callback(text, data)]
}

pub fn welcome_keyboard(linked: bool) -> InlineKeyboardMarkup {
    if linked {
        InlineKeyboardMarkup::new(vec![
            button("📜 Open Menu", "show_menu"),
            button("❌ Disconnect WhatsApp", "disconnect_whatsapp"),
            button("🆘 Support", "support"),
        ])
    } else {
        InlineKeyboardMarkup::new(vec![
            button("📱 Connect WhatsApp", "start_pairing"),
            button("🆘 Support", "support"),
        ])
    }
}

pub fn menu_keyboard(linked: bool) -> InlineKeyboardMarkup {
    let link = if linked {
        button("❌ Disconnect WhatsApp", "disconnect_whatsapp")
    } else {
        button("📱 Connect WhatsApp", "start_pairing")
    };
    InlineKeyboardMarkup::new(vec![link, button("🆘 Support", "support")])
}

pub fn disconnect_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![button("❌ Disconnect WhatsApp", "disconnect_whatsapp")])
}

pub fn connect_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![button("📱 Connect WhatsApp", "start_pairing")])
}

pub fn cancel_pairing_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![button("❌ Cancel", "cancel_pairing")])
}

pub fn retry_pairing_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![button("🔁 Try again", "start_pairing")])
}

pub fn purchase_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        button("💎 See prices", "show_prices"),
        button("🆘 Contact support", "support"),
    ])
}

pub fn admin_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        button("➕ Add VIP", "admin_addvip"),
        button("📢 Notify VIPs", "admin_notify"),
        button("📊 Statistics", "admin_stats"),
        button("👑 Panel", "admin_panel"),
        button("⬇️ Download users", "admin_download_users"),
        vec![
            InlineKeyboardButton::callback("🟢 FREE on", "admin_free_on"),
            InlineKeyboardButton::callback("🔴 FREE off", "admin_free_off"),
        ],
    ])
}

pub fn notify_kind_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        button("Text", "admin_notify_text"),
        button("Media (photo, video, audio, file...)", "admin_notify_media"),
    ])
}

pub fn support_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![button("🆘 Contact support", "support")])
}
