//! Creates the authorization server tables:
//! - oauth2_client: registered OAuth2 clients
//! - oauth2_authorization: single-use authorization codes
//! - oauth2_token: access/refresh token pairs
//! - oauth2_device_authorization: RFC 8628 device grants

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. Clients
        manager
            .create_table(
                Table::create()
                    .table(OAuth2Client::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2Client::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuth2Client::Name).string().not_null())
                    .col(ColumnDef::new(OAuth2Client::SecretHash).string().null())
                    .col(
                        ColumnDef::new(OAuth2Client::IsPublic)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(OAuth2Client::RedirectUris).text().not_null())
                    .col(
                        ColumnDef::new(OAuth2Client::GrantTypes)
                            .text()
                            .not_null()
                            .default("authorization_code"),
                    )
                    .col(ColumnDef::new(OAuth2Client::Scopes).text().not_null())
                    .col(ColumnDef::new(OAuth2Client::OwnerUserId).string().null())
                    .col(
                        ColumnDef::new(OAuth2Client::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(OAuth2Client::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Client::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 2. Authorization codes (short-lived, single use)
        manager
            .create_table(
                Table::create()
                    .table(OAuth2Authorization::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2Authorization::Code)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::ClientId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::RedirectUri)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OAuth2Authorization::Scope).text().not_null())
                    .col(
                        ColumnDef::new(OAuth2Authorization::CodeChallenge)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::CodeChallengeMethod)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::Used)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 3. Token pairs
        manager
            .create_table(
                Table::create()
                    .table(OAuth2Token::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2Token::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Token::AccessToken)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Token::RefreshToken)
                            .string()
                            .null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(OAuth2Token::ClientId).string().not_null())
                    .col(ColumnDef::new(OAuth2Token::UserId).string().not_null())
                    .col(ColumnDef::new(OAuth2Token::Scope).text().not_null())
                    .col(
                        ColumnDef::new(OAuth2Token::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Token::RefreshExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Token::Revoked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OAuth2Token::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 4. Device authorizations
        manager
            .create_table(
                Table::create()
                    .table(OAuth2DeviceAuthorization::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2DeviceAuthorization::DeviceCode)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2DeviceAuthorization::UserCode)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2DeviceAuthorization::ClientId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2DeviceAuthorization::Scope)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2DeviceAuthorization::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(OAuth2DeviceAuthorization::UserId)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2DeviceAuthorization::Interval)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2DeviceAuthorization::LastPollAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2DeviceAuthorization::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2DeviceAuthorization::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Lookup and cleanup indexes
        create_index(
            manager,
            "idx_oauth2_client_owner_user_id",
            OAuth2Client::Table,
            OAuth2Client::OwnerUserId,
        )
        .await?;
        create_index(
            manager,
            "idx_oauth2_authorization_client_id",
            OAuth2Authorization::Table,
            OAuth2Authorization::ClientId,
        )
        .await?;
        create_index(
            manager,
            "idx_oauth2_authorization_expires_at",
            OAuth2Authorization::Table,
            OAuth2Authorization::ExpiresAt,
        )
        .await?;
        create_index(
            manager,
            "idx_oauth2_token_client_id",
            OAuth2Token::Table,
            OAuth2Token::ClientId,
        )
        .await?;
        create_index(
            manager,
            "idx_oauth2_token_expires_at",
            OAuth2Token::Table,
            OAuth2Token::ExpiresAt,
        )
        .await?;
        create_index(
            manager,
            "idx_oauth2_token_refresh_expires_at",
            OAuth2Token::Table,
            OAuth2Token::RefreshExpiresAt,
        )
        .await?;
        create_index(
            manager,
            "idx_oauth2_device_authorization_user_code",
            OAuth2DeviceAuthorization::Table,
            OAuth2DeviceAuthorization::UserCode,
        )
        .await?;
        create_index(
            manager,
            "idx_oauth2_device_authorization_expires_at",
            OAuth2DeviceAuthorization::Table,
            OAuth2DeviceAuthorization::ExpiresAt,
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in [
            "idx_oauth2_device_authorization_expires_at",
            "idx_oauth2_device_authorization_user_code",
            "idx_oauth2_token_refresh_expires_at",
            "idx_oauth2_token_expires_at",
            "idx_oauth2_token_client_id",
            "idx_oauth2_authorization_expires_at",
            "idx_oauth2_authorization_client_id",
            "idx_oauth2_client_owner_user_id",
        ] {
            manager
                .drop_index(Index::drop().name(name).to_owned())
                .await?;
        }

        manager
            .drop_table(
                Table::drop()
                    .table(OAuth2DeviceAuthorization::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2Token::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2Authorization::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2Client::Table).to_owned())
            .await?;

        Ok(())
    }
}

async fn create_index<T, C>(
    manager: &SchemaManager<'_>,
    name: &str,
    table: T,
    column: C,
) -> Result<(), DbErr>
where
    T: Iden + 'static,
    C: Iden + 'static,
{
    manager
        .create_index(
            Index::create()
                .if_not_exists()
                .name(name)
                .table(table)
                .col(column)
                .to_owned(),
        )
        .await
}

#[derive(DeriveIden)]
enum OAuth2Client {
    #[sea_orm(iden = "oauth2_client")]
    Table,
    Id,
    Name,
    SecretHash,
    IsPublic,
    RedirectUris,
    GrantTypes,
    Scopes,
    OwnerUserId,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum OAuth2Authorization {
    #[sea_orm(iden = "oauth2_authorization")]
    Table,
    Code,
    ClientId,
    UserId,
    RedirectUri,
    Scope,
    CodeChallenge,
    CodeChallengeMethod,
    Used,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OAuth2Token {
    #[sea_orm(iden = "oauth2_token")]
    Table,
    Id,
    AccessToken,
    RefreshToken,
    ClientId,
    UserId,
    Scope,
    ExpiresAt,
    RefreshExpiresAt,
    Revoked,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OAuth2DeviceAuthorization {
    #[sea_orm(iden = "oauth2_device_authorization")]
    Table,
    DeviceCode,
    UserCode,
    ClientId,
    Scope,
    Status,
    UserId,
    Interval,
    LastPollAt,
    ExpiresAt,
    CreatedAt,
}
