use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use omnipa_core::{ItemChanges, NewItem, RecordId, ShoppingItem, ShoppingList, ShoppingListDetail};

/// Shopping lists and items, scoped per user. Deleting a list archives it.
pub struct ListRepository {
    pool: SqlitePool,
}

// Row types for database queries
#[derive(sqlx::FromRow)]
struct ListRow {
    id: String,
    name: String,
    description: Option<String>,
    archived: bool,
    created_at: String,
    updated_at: String,
    item_count: i64,
    completed_count: i64,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: String,
    list_id: String,
    name: String,
    quantity: Option<f64>,
    unit: Option<String>,
    category: Option<String>,
    notes: Option<String>,
    is_completed: bool,
    estimated_price: Option<f64>,
    actual_price: Option<f64>,
    created_at: String,
    updated_at: String,
}

const LIST_COLUMNS: &str = r#"
    SELECT l.id, l.name, l.description, l.archived, l.created_at, l.updated_at,
           COUNT(i.id) AS item_count,
           COALESCE(SUM(i.is_completed), 0) AS completed_count
    FROM shopping_lists l
    LEFT JOIN shopping_items i ON i.list_id = l.id
"#;

impl ListRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Non-archived lists, newest first.
    pub async fn list(&self, user_id: &str) -> Result<Vec<ShoppingList>, sqlx::Error> {
        let query = format!(
            "{} WHERE l.user_id = ? AND l.archived = 0 GROUP BY l.id ORDER BY l.created_at DESC, l.rowid DESC",
            LIST_COLUMNS
        );
        let rows: Vec<ListRow> = sqlx::query_as(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(ShoppingList::try_from).collect()
    }

    pub async fn get(&self, user_id: &str, id: &str) -> Result<Option<ShoppingList>, sqlx::Error> {
        let query = format!(
            "{} WHERE l.user_id = ? AND l.id = ? AND l.archived = 0 GROUP BY l.id",
            LIST_COLUMNS
        );
        let row: Option<ListRow> = sqlx::query_as(&query)
            .bind(user_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ShoppingList::try_from).transpose()
    }

    pub async fn get_detail(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<ShoppingListDetail>, sqlx::Error> {
        let Some(list) = self.get(user_id, id).await? else {
            return Ok(None);
        };

        let rows: Vec<ItemRow> = sqlx::query_as(
            "SELECT * FROM shopping_items WHERE list_id = ? ORDER BY created_at, rowid",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(ShoppingItem::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(ShoppingListDetail { list, items }))
    }

    pub async fn create(
        &self,
        user_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> Result<ShoppingList, sqlx::Error> {
        let id = Uuid::new_v4().to_string();
        let now = timestamp(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO shopping_lists (id, user_id, name, description, archived, created_at, updated_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(name)
        .bind(description)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get(user_id, &id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Add items to a list. Returns `None` if the list does not exist.
    pub async fn add_items(
        &self,
        user_id: &str,
        list_id: &str,
        items: &[NewItem],
    ) -> Result<Option<Vec<ShoppingItem>>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM shopping_lists WHERE id = ? AND user_id = ? AND archived = 0",
        )
        .bind(list_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let now = Utc::now();
        let created_at = timestamp(now);
        let mut created = Vec::with_capacity(items.len());
        for item in items {
            let id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO shopping_items (id, list_id, name, quantity, unit, category, notes, is_completed, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(list_id)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(&item.unit)
            .bind(&item.category)
            .bind(&item.notes)
            .bind(&created_at)
            .bind(&created_at)
            .execute(&mut *tx)
            .await?;

            created.push(ShoppingItem::from_new(
                RecordId::server(id),
                RecordId::server(list_id),
                item,
                now,
            ));
        }

        touch_list(&mut tx, list_id, &created_at).await?;
        tx.commit().await?;
        Ok(Some(created))
    }

    /// Merge changes into an item. Returns `None` if the item is not on one
    /// of the user's lists.
    pub async fn update_item(
        &self,
        user_id: &str,
        item_id: &str,
        changes: &ItemChanges,
    ) -> Result<Option<ShoppingItem>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let row: Option<ItemRow> = sqlx::query_as(
            r#"
            SELECT i.* FROM shopping_items i
            JOIN shopping_lists l ON l.id = i.list_id
            WHERE i.id = ? AND l.user_id = ? AND l.archived = 0
            "#,
        )
        .bind(item_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut item = ShoppingItem::try_from(row)?;
        item.apply_changes(changes, Utc::now());
        let updated_at = timestamp(item.updated_at);

        sqlx::query(
            r#"
            UPDATE shopping_items
            SET name = ?, quantity = ?, unit = ?, category = ?, notes = ?,
                is_completed = ?, actual_price = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&item.name)
        .bind(item.quantity)
        .bind(&item.unit)
        .bind(&item.category)
        .bind(&item.notes)
        .bind(item.is_completed)
        .bind(item.actual_price)
        .bind(&updated_at)
        .bind(item_id)
        .execute(&mut *tx)
        .await?;

        touch_list(&mut tx, &item.list_id.to_string(), &updated_at).await?;
        tx.commit().await?;
        Ok(Some(item))
    }

    /// Archive a list. Returns false if there was no such active list.
    pub async fn archive(&self, user_id: &str, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE shopping_lists SET archived = 1, updated_at = ? WHERE id = ? AND user_id = ? AND archived = 0",
        )
        .bind(timestamp(Utc::now()))
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

async fn touch_list(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    list_id: &str,
    updated_at: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE shopping_lists SET updated_at = ? WHERE id = ?")
        .bind(updated_at)
        .bind(list_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

impl TryFrom<ListRow> for ShoppingList {
    type Error = sqlx::Error;

    fn try_from(row: ListRow) -> Result<Self, Self::Error> {
        Ok(ShoppingList {
            id: RecordId::server(row.id),
            name: row.name,
            description: row.description,
            item_count: row.item_count as u32,
            completed_count: row.completed_count as u32,
            archived: row.archived,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

impl TryFrom<ItemRow> for ShoppingItem {
    type Error = sqlx::Error;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(ShoppingItem {
            id: RecordId::server(row.id),
            list_id: RecordId::server(row.list_id),
            name: row.name,
            quantity: row.quantity,
            unit: row.unit,
            category: row.category,
            notes: row.notes,
            is_completed: row.is_completed,
            estimated_price: row.estimated_price,
            actual_price: row.actual_price,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}
