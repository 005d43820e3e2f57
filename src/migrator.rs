use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240301_000001_create_inventory_items_table::Migration),
            Box::new(m20240301_000002_create_stock_transactions_table::Migration),
            Box::new(m20240301_000003_create_alerts_table::Migration),
        ]
    }
}

mod m20240301_000001_create_inventory_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000001_create_inventory_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryItems::Name).string().not_null())
                        .col(ColumnDef::new(InventoryItems::Description).text().null())
                        .col(ColumnDef::new(InventoryItems::Category).string().not_null())
                        .col(
                            ColumnDef::new(InventoryItems::Quantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::UnitPrice)
                                .decimal_len(14, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::ReorderPoint)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(InventoryItems::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(InventoryItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .check(Expr::col(InventoryItems::Quantity).gte(0))
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_items_owner_updated")
                        .table(InventoryItems::Table)
                        .col(InventoryItems::CreatedBy)
                        .col(InventoryItems::UpdatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_items_owner_category")
                        .table(InventoryItems::Table)
                        .col(InventoryItems::CreatedBy)
                        .col(InventoryItems::Category)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum InventoryItems {
        Table,
        Id,
        Name,
        Description,
        Category,
        Quantity,
        UnitPrice,
        ReorderPoint,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240301_000002_create_stock_transactions_table {
    use super::m20240301_000001_create_inventory_items_table::InventoryItems;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000002_create_stock_transactions_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockTransactions::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockTransactions::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockTransactions::ItemId).uuid().not_null())
                        .col(
                            ColumnDef::new(StockTransactions::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::TransactionType)
                                .string_len(16)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::Date)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockTransactions::Notes).text().null())
                        .col(
                            ColumnDef::new(StockTransactions::TotalValue)
                                .decimal_len(16, 4)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransactions::CreatedBy)
                                .uuid()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_transactions_item_id")
                                .from(StockTransactions::Table, StockTransactions::ItemId)
                                .to(InventoryItems::Table, InventoryItems::Id)
                                .on_delete(ForeignKeyAction::Restrict)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_transactions_item_id")
                        .table(StockTransactions::Table)
                        .col(StockTransactions::ItemId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_transactions_owner_date")
                        .table(StockTransactions::Table)
                        .col(StockTransactions::CreatedBy)
                        .col(StockTransactions::Date)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockTransactions::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockTransactions {
        Table,
        Id,
        ItemId,
        Quantity,
        TransactionType,
        Date,
        Notes,
        TotalValue,
        CreatedBy,
    }
}

mod m20240301_000003_create_alerts_table {
    use super::m20240301_000001_create_inventory_items_table::InventoryItems;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240301_000003_create_alerts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Alerts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Alerts::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Alerts::ItemId).uuid().not_null())
                        .col(ColumnDef::new(Alerts::AlertType).string_len(20).not_null())
                        .col(ColumnDef::new(Alerts::Message).text().not_null())
                        .col(ColumnDef::new(Alerts::Priority).string_len(10).not_null())
                        .col(ColumnDef::new(Alerts::CreatedBy).uuid().not_null())
                        .col(
                            ColumnDef::new(Alerts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_alerts_item_id")
                                .from(Alerts::Table, Alerts::ItemId)
                                .to(InventoryItems::Table, InventoryItems::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_alerts_item_type")
                        .table(Alerts::Table)
                        .col(Alerts::ItemId)
                        .col(Alerts::AlertType)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Alerts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Alerts {
        Table,
        Id,
        ItemId,
        AlertType,
        Message,
        Priority,
        CreatedBy,
        CreatedAt,
    }
}
