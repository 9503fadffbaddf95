use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::repo_types::{FoodItemRow, MealRow, NewMeal};
use crate::analysis::AnalysisResult;

const MEAL_COLUMNS: &str = "id, user_id, title, image_ref, thumbnail_ref, total_calories, \
     total_protein, total_carbs, total_fat, synthetic, meal_time, created_at";

/// Persistence for analysed and saved meals.
#[async_trait]
pub trait MealStore: Send + Sync {
    /// Appends a raw analysis to the user's analysis log.
    async fn record_analysis(&self, user_id: Uuid, result: &AnalysisResult) -> anyhow::Result<Uuid>;

    /// Inserts the meal and its food items atomically.
    async fn create_meal(&self, user_id: Uuid, meal: &NewMeal) -> anyhow::Result<MealRow>;

    async fn list_meals(&self, user_id: Uuid, limit: i64, offset: i64) -> anyhow::Result<Vec<MealRow>>;

    async fn get_meal(
        &self,
        user_id: Uuid,
        meal_id: Uuid,
    ) -> anyhow::Result<Option<(MealRow, Vec<FoodItemRow>)>>;

    /// Removes the meal and its food items, returning the deleted row.
    async fn delete_meal(&self, user_id: Uuid, meal_id: Uuid) -> anyhow::Result<Option<MealRow>>;
}

#[derive(Clone)]
pub struct PgMealStore {
    db: PgPool,
}

impl PgMealStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MealStore for PgMealStore {
    async fn record_analysis(&self, user_id: Uuid, result: &AnalysisResult) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO food_analysis_results (id, user_id, result, synthetic)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(sqlx::types::Json(result))
        .bind(result.synthetic)
        .execute(&self.db)
        .await
        .context("insert analysis result")?;
        Ok(id)
    }

    async fn create_meal(&self, user_id: Uuid, meal: &NewMeal) -> anyhow::Result<MealRow> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let row = sqlx::query_as::<_, MealRow>(&format!(
            r#"
            INSERT INTO meals (id, user_id, title, image_ref, thumbnail_ref, total_calories,
                               total_protein, total_carbs, total_fat, synthetic, meal_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, COALESCE($11, now()))
            RETURNING {MEAL_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&meal.title)
        .bind(&meal.image_ref)
        .bind(&meal.thumbnail_ref)
        .bind(meal.total_calories)
        .bind(meal.total_protein)
        .bind(meal.total_carbs)
        .bind(meal.total_fat)
        .bind(meal.synthetic)
        .bind(meal.meal_time)
        .fetch_one(&mut *tx)
        .await
        .context("insert meal")?;

        for (position, item) in meal.items.iter().enumerate() {
            insert_food_item_tx(&mut tx, user_id, row.id, position as i32, item).await?;
        }

        tx.commit().await.context("commit tx")?;
        Ok(row)
    }

    async fn list_meals(&self, user_id: Uuid, limit: i64, offset: i64) -> anyhow::Result<Vec<MealRow>> {
        let rows = sqlx::query_as::<_, MealRow>(&format!(
            r#"
            SELECT {MEAL_COLUMNS}
              FROM meals
             WHERE user_id = $1
             ORDER BY meal_time DESC, created_at DESC
             LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .context("list meals")?;
        Ok(rows)
    }

    async fn get_meal(
        &self,
        user_id: Uuid,
        meal_id: Uuid,
    ) -> anyhow::Result<Option<(MealRow, Vec<FoodItemRow>)>> {
        let meal = sqlx::query_as::<_, MealRow>(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals WHERE id = $1 AND user_id = $2"
        ))
        .bind(meal_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("get meal")?;

        let Some(meal) = meal else {
            return Ok(None);
        };

        let items = sqlx::query_as::<_, FoodItemRow>(
            r#"
            SELECT f.id, f.name, f.calories, f.protein_grams, f.carbs_grams, f.fat_grams,
                   f.portion, mi.quantity
              FROM meal_items mi
              JOIN food_items f ON f.id = mi.food_item_id
             WHERE mi.meal_id = $1
             ORDER BY mi.position ASC
            "#,
        )
        .bind(meal_id)
        .fetch_all(&self.db)
        .await
        .context("list meal items")?;

        Ok(Some((meal, items)))
    }

    async fn delete_meal(&self, user_id: Uuid, meal_id: Uuid) -> anyhow::Result<Option<MealRow>> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        sqlx::query(
            r#"
            DELETE FROM food_items
             WHERE user_id = $2
               AND id IN (SELECT food_item_id FROM meal_items WHERE meal_id = $1)
            "#,
        )
        .bind(meal_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("delete food items")?;

        let row = sqlx::query_as::<_, MealRow>(&format!(
            "DELETE FROM meals WHERE id = $1 AND user_id = $2 RETURNING {MEAL_COLUMNS}"
        ))
        .bind(meal_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .context("delete meal")?;

        tx.commit().await.context("commit tx")?;
        Ok(row)
    }
}

async fn insert_food_item_tx(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    meal_id: Uuid,
    position: i32,
    item: &crate::analysis::FoodItem,
) -> anyhow::Result<()> {
    let food_item_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO food_items (id, user_id, name, calories, protein_grams, carbs_grams, fat_grams, portion)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(food_item_id)
    .bind(user_id)
    .bind(&item.name)
    .bind(item.calories)
    .bind(item.protein)
    .bind(item.carbs)
    .bind(item.fat)
    .bind(&item.portion)
    .execute(&mut **tx)
    .await
    .context("insert food item")?;

    sqlx::query(
        r#"
        INSERT INTO meal_items (meal_id, food_item_id, quantity, position)
        VALUES ($1, $2, 1, $3)
        "#,
    )
    .bind(meal_id)
    .bind(food_item_id)
    .bind(position)
    .execute(&mut **tx)
    .await
    .context("insert meal item")?;

    Ok(())
}
