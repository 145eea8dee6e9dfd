use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Consents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Consents::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Consents::Status))
                    .col(string(Consents::UserId))
                    .col(string_null(Consents::BusinessId))
                    .col(string(Consents::ClientId))
                    // JSON array of permission codes
                    .col(text(Consents::Permissions))
                    .col(big_integer(Consents::CreatedAt))
                    .col(big_integer(Consents::StatusUpdatedAt))
                    .col(big_integer_null(Consents::ExpiresAt))
                    .col(string_null(Consents::RejectedBy))
                    .col(string_null(Consents::RejectionReason))
                    // JSON array, most recent extension first
                    .col(text(Consents::Extensions))
                    .col(text(Consents::Resources))
                    .col(
                        ColumnDef::new(Consents::Version)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .to_owned(),
            )
            .await?;

        // The sweep job scans consents that are not rejected yet
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_consent_status")
                    .table(Consents::Table)
                    .col(Consents::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_consent_client")
                    .table(Consents::Table)
                    .col(Consents::ClientId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Consents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Consents {
    Table,
    Id,
    Status,
    UserId,
    BusinessId,
    ClientId,
    Permissions,
    CreatedAt,
    StatusUpdatedAt,
    ExpiresAt,
    RejectedBy,
    RejectionReason,
    Extensions,
    Resources,
    Version,
}
