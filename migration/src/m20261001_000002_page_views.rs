//! 页面浏览计数表迁移
//!
//! - page_views: 每页每天一行，保存当天总浏览数
//! - page_view_hours: 每页每天每小时一行，保存小时计数
//!
//! 两张表都只做累加，不删除历史数据。

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. page_views 表
        manager
            .create_table(
                Table::create()
                    .table(PageView::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PageView::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PageView::PageId).string_len(255).not_null())
                    .col(ColumnDef::new(PageView::Date).string_len(10).not_null())
                    .col(
                        ColumnDef::new(PageView::TotalViews)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PageView::LastUpdated)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 唯一索引：page_id + date（对应文档 ID `${pageId}_${date}`）
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_page_views_page_date")
                    .table(PageView::Table)
                    .col(PageView::PageId)
                    .col(PageView::Date)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 索引：date + total_views（热门候选查询）
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_page_views_date_total")
                    .table(PageView::Table)
                    .col(PageView::Date)
                    .col(PageView::TotalViews)
                    .to_owned(),
            )
            .await?;

        // 2. page_view_hours 表
        manager
            .create_table(
                Table::create()
                    .table(PageViewHour::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PageViewHour::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PageViewHour::PageId)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(PageViewHour::Date).string_len(10).not_null())
                    .col(ColumnDef::new(PageViewHour::Hour).integer().not_null())
                    .col(
                        ColumnDef::new(PageViewHour::Views)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_page_view_hours_page_date_hour")
                    .table(PageViewHour::Table)
                    .col(PageViewHour::PageId)
                    .col(PageViewHour::Date)
                    .col(PageViewHour::Hour)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_page_view_hours_page_date_hour")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(PageViewHour::Table).to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_page_views_date_total").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_page_views_page_date").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(PageView::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PageView {
    #[sea_orm(iden = "page_views")]
    Table,
    Id,
    PageId,
    Date,
    TotalViews,
    LastUpdated,
}

#[derive(DeriveIden)]
enum PageViewHour {
    #[sea_orm(iden = "page_view_hours")]
    Table,
    Id,
    PageId,
    Date,
    Hour,
    Views,
}
