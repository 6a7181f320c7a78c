use std::collections::HashMap;

use crate::errors::Result;
use crate::storage::models::{HOURS_PER_DAY, Page, UserProfile, ViewBucket, parse_date_key};
use migration::entities::{page, page_view, page_view_hour, user};

/// 数据库中的计数可能为负（手工修改等），统一截断为 0
fn non_negative(value: i64) -> u64 {
    value.max(0) as u64
}

/// 将 Sea-ORM Model 转换为 Page
pub fn model_to_page(model: page::Model) -> Page {
    Page {
        id: model.id,
        user_id: model.user_id,
        title: model.title,
        is_public: model.is_public,
        deleted: model.deleted,
        views: non_negative(model.views),
        views_24h: model.views_24h.map(non_negative),
    }
}

/// 将 Page 转换为 ActiveModel（用于 upsert）
pub fn page_to_active_model(p: &Page) -> page::ActiveModel {
    use sea_orm::ActiveValue::Set;

    page::ActiveModel {
        id: Set(p.id.clone()),
        user_id: Set(p.user_id.clone()),
        title: Set(p.title.clone()),
        is_public: Set(p.is_public),
        deleted: Set(p.deleted),
        views: Set(p.views as i64),
        views_24h: Set(p.views_24h.map(|v| v as i64)),
    }
}

pub fn model_to_user(model: user::Model) -> UserProfile {
    UserProfile {
        id: model.id,
        username: model.username,
        display_name: model.display_name,
    }
}

pub fn user_to_active_model(u: &UserProfile) -> user::ActiveModel {
    use sea_orm::ActiveValue::Set;

    user::ActiveModel {
        id: Set(u.id.clone()),
        username: Set(u.username.clone()),
        display_name: Set(u.display_name.clone()),
    }
}

/// 由天级行和小时行拼出浏览桶；超出 0..24 的小时行被忽略
pub fn rows_to_bucket(
    daily: page_view::Model,
    hours: &[page_view_hour::Model],
) -> Result<ViewBucket> {
    let date = parse_date_key(&daily.date)?;
    let mut bucket = ViewBucket::empty(daily.page_id, date, daily.last_updated);
    for row in hours {
        if let Ok(hour) = usize::try_from(row.hour)
            && hour < HOURS_PER_DAY
        {
            bucket.hours[hour] = non_negative(row.views);
        }
    }
    bucket.total_views = non_negative(daily.total_views);
    Ok(bucket)
}

/// 按 page_id 分组小时行
pub fn group_hours_by_page(
    rows: Vec<page_view_hour::Model>,
) -> HashMap<String, Vec<page_view_hour::Model>> {
    let mut grouped: HashMap<String, Vec<page_view_hour::Model>> = HashMap::new();
    for row in rows {
        grouped.entry(row.page_id.clone()).or_default().push(row);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn hour_row(page_id: &str, hour: i32, views: i64) -> page_view_hour::Model {
        page_view_hour::Model {
            id: 0,
            page_id: page_id.to_string(),
            date: "2026-10-16".to_string(),
            hour,
            views,
        }
    }

    #[test]
    fn test_rows_to_bucket() {
        let daily = page_view::Model {
            id: 1,
            page_id: "p1".to_string(),
            date: "2026-10-16".to_string(),
            total_views: 4,
            last_updated: Utc::now(),
        };
        let rows = vec![hour_row("p1", 3, 1), hour_row("p1", 14, 3), hour_row("p1", 99, 7)];

        let bucket = rows_to_bucket(daily, &rows).unwrap();
        assert_eq!(bucket.doc_id(), "p1_2026-10-16");
        assert_eq!(bucket.hours[3], 1);
        assert_eq!(bucket.hours[14], 3);
        assert_eq!(bucket.hours_sum(), 4);
        assert_eq!(bucket.total_views, 4);
    }

    #[test]
    fn test_rows_to_bucket_rejects_bad_date() {
        let daily = page_view::Model {
            id: 1,
            page_id: "p1".to_string(),
            date: "yesterday".to_string(),
            total_views: 0,
            last_updated: Utc::now(),
        };
        assert!(rows_to_bucket(daily, &[]).is_err());
    }

    #[test]
    fn test_page_conversion_clamps_negative_counts() {
        let page = model_to_page(page::Model {
            id: "p1".to_string(),
            user_id: "u1".to_string(),
            title: None,
            is_public: true,
            deleted: false,
            views: -3,
            views_24h: Some(-1),
        });
        assert_eq!(page.views, 0);
        assert_eq!(page.views_24h, Some(0));
    }

    #[test]
    fn test_group_hours_by_page() {
        let grouped = group_hours_by_page(vec![
            hour_row("a", 1, 1),
            hour_row("b", 2, 1),
            hour_row("a", 3, 1),
        ]);
        assert_eq!(grouped["a"].len(), 2);
        assert_eq!(grouped["b"].len(), 1);
    }
}
