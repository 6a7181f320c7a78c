pub mod page;
pub mod page_view;
pub mod page_view_hour;
pub mod user;

pub use page::Entity as PageEntity;
pub use page_view::Entity as PageViewEntity;
pub use page_view_hour::Entity as PageViewHourEntity;
pub use user::Entity as UserEntity;
