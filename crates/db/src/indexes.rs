use std::time::Duration;

use mongodb::{Database, IndexModel, options::IndexOptions};
use tracing::info;

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Users
    create_indexes(
        db,
        "users",
        vec![
            index_unique(bson::doc! { "email": 1 }),
            index_unique(bson::doc! { "slug": 1 }),
            index_unique_sparse(bson::doc! { "google_id": 1 }),
        ],
    )
    .await?;

    // Teams
    create_indexes(
        db,
        "teams",
        vec![
            index_unique(bson::doc! { "slug": 1 }),
            index(bson::doc! { "leader_id": 1 }),
            index(bson::doc! { "member_ids": 1 }),
            index(bson::doc! { "stripe_subscription.id": 1 }),
        ],
    )
    .await?;

    // Discussions
    create_indexes(
        db,
        "discussions",
        vec![
            index_unique(bson::doc! { "team_id": 1, "slug": 1 }),
            index(bson::doc! { "team_id": 1, "created_at": -1 }),
            index(bson::doc! { "member_ids": 1 }),
        ],
    )
    .await?;

    // Posts: the trailing _id matches the pagination sort's tiebreak
    create_indexes(
        db,
        "posts",
        vec![index(bson::doc! { "discussion_id": 1, "created_at": 1, "_id": 1 })],
    )
    .await?;

    // Invitations
    create_indexes(
        db,
        "invitations",
        vec![
            index_unique(bson::doc! { "team_id": 1, "email": 1 }),
            index_unique(bson::doc! { "token": 1 }),
            index_ttl(bson::doc! { "expires_at": 1 }),
        ],
    )
    .await?;

    // Email Templates
    create_indexes(
        db,
        "email_templates",
        vec![index_unique(bson::doc! { "name": 1 })],
    )
    .await?;

    // Login Tokens
    create_indexes(
        db,
        "login_tokens",
        vec![
            index_unique(bson::doc! { "user_id": 1 }),
            index_ttl(bson::doc! { "expires_at": 1 }),
        ],
    )
    .await?;

    info!("All indexes ensured");
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_unique(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

fn index_unique_sparse(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).sparse(true).build())
        .build()
}

/// TTL index; the field holds the expiry instant itself, so the
/// grace period is zero.
fn index_ttl(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .expire_after(Duration::from_secs(0))
                .build(),
        )
        .build()
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    db.collection::<bson::Document>(collection)
        .create_indexes(indexes)
        .await?;
    info!(collection, "Indexes created");
    Ok(())
}
