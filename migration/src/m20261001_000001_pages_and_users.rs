//! 页面与用户表迁移
//!
//! 只包含浏览统计需要读写的字段：
//! - pages: 归属用户、可见性、删除标记、累计浏览数、24 小时浏览缓存
//! - users: 用户名与显示名（只读）

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Page::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Page::Id)
                            .string_len(255)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Page::UserId).string_len(255).not_null())
                    .col(ColumnDef::new(Page::Title).text().null())
                    .col(
                        ColumnDef::new(Page::IsPublic)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Page::Deleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Page::Views)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Page::Views24h).big_integer().null())
                    .to_owned(),
            )
            .await?;

        // 热门回填查询：按 views_24h / views 排序
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_pages_views_24h")
                    .table(Page::Table)
                    .col(Page::Views24h)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_pages_views")
                    .table(Page::Table)
                    .col(Page::Views)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(User::Id)
                            .string_len(255)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(User::Username).string_len(255).null())
                    .col(ColumnDef::new(User::DisplayName).string_len(255).null())
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_pages_views").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_pages_views_24h").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Page::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Page {
    #[sea_orm(iden = "pages")]
    Table,
    Id,
    UserId,
    Title,
    IsPublic,
    Deleted,
    Views,
    #[sea_orm(iden = "views_24h")]
    Views24h,
}

#[derive(DeriveIden)]
enum User {
    #[sea_orm(iden = "users")]
    Table,
    Id,
    Username,
    DisplayName,
}
