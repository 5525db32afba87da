use crate::config::NotifierConfig;
use crate::notify::Notification;
use crate::types::Item;

pub fn footer_for(site_name: &str, now: &str) -> String {
    format!("From {} • {}", site_name, now)
}

pub fn notification_from_item(item: &Item, identity: &NotifierConfig, now: &str) -> Notification {
    Notification {
        display_name: identity.username.clone(),
        avatar_url: identity.avatar_url.clone(),
        title: item.title.clone(),
        url: Some(item.link.clone()),
        description: None,
        image_url: item.image.clone(),
        footer: footer_for(&item.site_name, now),
    }
}

pub fn startup_notification(identity: &NotifierConfig, now: &str) -> Notification {
    Notification {
        display_name: identity.username.clone(),
        avatar_url: identity.avatar_url.clone(),
        title: format!("🚀 {} started", env!("CARGO_PKG_NAME")),
        url: None,
        description: Some(format!(
            "Version `{}` is now checking for updates...",
            env!("CARGO_PKG_VERSION")
        )),
        image_url: None,
        footer: format!("Started at {}", now),
    }
}

pub fn local_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
