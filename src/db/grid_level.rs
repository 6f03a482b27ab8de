//! Grid level persistence

use rusqlite::{params, Connection, Result as SqlResult, Row};

use super::{decimal_col, decimal_to_sql, enum_col, millis_col, Database};
use crate::core::level::{GridLevel, LevelRecord};
use crate::error::GridResult;

impl GridLevel {
    fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(GridLevel::rehydrate(LevelRecord {
            id: Some(row.get(0)?),
            config_id: row.get(1)?,
            level_index: row.get(2)?,
            price: decimal_col(row, 3)?,
            side: Some(enum_col(row, 4)?),
            status: Some(enum_col(row, 5)?),
            entry_order_id: row.get(6)?,
            entry_client_order_id: row.get(7)?,
            exit_order_id: row.get(8)?,
            exit_client_order_id: row.get(9)?,
            blocked_until: millis_col(row, 10)?,
        }))
    }

    /// Insert or update keyed on (config_id, level_index)
    fn upsert(&self, conn: &Connection) -> SqlResult<i64> {
        conn.execute(
            "INSERT INTO grid_levels (
                config_id, level_index, price, side, status, entry_order_id,
                entry_client_order_id, exit_order_id, exit_client_order_id, blocked_until
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (config_id, level_index) DO UPDATE SET
                price = excluded.price,
                side = excluded.side,
                status = excluded.status,
                entry_order_id = excluded.entry_order_id,
                entry_client_order_id = excluded.entry_client_order_id,
                exit_order_id = excluded.exit_order_id,
                exit_client_order_id = excluded.exit_client_order_id,
                blocked_until = excluded.blocked_until,
                updated_at = CURRENT_TIMESTAMP",
            params![
                self.config_id,
                self.level_index,
                decimal_to_sql(&self.price),
                self.side.as_str(),
                self.status().as_str(),
                self.entry_order().map(|o| o.order_id.as_str()),
                self.entry_order().map(|o| o.client_order_id.as_str()),
                self.exit_order().map(|o| o.order_id.as_str()),
                self.exit_order().map(|o| o.client_order_id.as_str()),
                self.blocked_until().map(|t| t.timestamp_millis()),
            ],
        )?;
        conn.query_row(
            "SELECT id FROM grid_levels WHERE config_id = ?1 AND level_index = ?2",
            params![self.config_id, self.level_index],
            |row| row.get(0),
        )
    }

    pub fn save(&mut self, db: &Database) -> GridResult<()> {
        let conn = db.lock()?;
        self.id = Some(self.upsert(&conn)?);
        Ok(())
    }

    /// Persist a batch of levels in one transaction
    pub fn save_all(db: &Database, levels: &mut [GridLevel]) -> GridResult<()> {
        let mut conn = db.lock()?;
        let tx = conn.transaction()?;
        for level in levels.iter_mut() {
            level.id = Some(level.upsert(&tx)?);
        }
        tx.commit()?;
        Ok(())
    }

    /// All levels of one config ordered by level index
    pub fn list_by_config(db: &Database, config_id: i64) -> GridResult<Vec<Self>> {
        let conn = db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, config_id, level_index, price, side, status, entry_order_id,
                    entry_client_order_id, exit_order_id, exit_client_order_id, blocked_until
             FROM grid_levels WHERE config_id = ?1 ORDER BY level_index",
        )?;
        let rows = stmt.query_map(params![config_id], |row| Self::from_row(row))?;
        Ok(rows.collect::<SqlResult<Vec<_>>>()?)
    }

    pub fn delete_by_config(db: &Database, config_id: i64) -> GridResult<usize> {
        let conn = db.lock()?;
        Ok(conn.execute("DELETE FROM grid_levels WHERE config_id = ?1", params![config_id])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::level::{LevelEvent, OrderRef};
    use crate::db::GridConfig;
    use crate::types::{GridMode, LevelStatus, OrderSide};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn setup() -> (Database, i64) {
        let db = Database::new_in_memory().unwrap();
        db.run_migrations().unwrap();
        let config = GridConfig::new(
            "eth", "sim", "ETHUSDT", GridMode::Short, dec!(1000), dec!(2000), 10, dec!(0.1), dec!(1),
        );
        let id = config.insert(&db).unwrap();
        (db, id)
    }

    #[test]
    fn test_level_round_trip() {
        let (db, config_id) = setup();
        let now = Utc::now();

        let mut level = GridLevel::new(config_id, -2, dec!(1333.33), OrderSide::Buy);
        level.save(&db).unwrap();
        assert!(level.id.is_some());

        level.transition(LevelEvent::EntryPlaced(OrderRef::new("o-1", "c-1"))).unwrap();
        level.cooldown(now, Duration::seconds(5));
        level.save(&db).unwrap();

        let loaded = GridLevel::list_by_config(&db, config_id).unwrap();
        assert_eq!(loaded.len(), 1);
        let loaded = &loaded[0];
        assert_eq!(loaded.status(), LevelStatus::EntryWorking);
        assert_eq!(loaded.entry_order().unwrap().client_order_id, "c-1");
        assert_eq!(loaded.price, dec!(1333.33));
        assert_eq!(
            loaded.blocked_until().unwrap().timestamp_millis(),
            (now + Duration::seconds(5)).timestamp_millis()
        );
    }

    #[test]
    fn test_unique_level_index_per_config() {
        let (db, config_id) = setup();
        let mut levels = vec![
            GridLevel::new(config_id, 0, dec!(1500), OrderSide::Sell),
            GridLevel::new(config_id, 1, dec!(1600), OrderSide::Sell),
        ];
        GridLevel::save_all(&db, &mut levels).unwrap();

        // Same index again updates in place instead of duplicating
        let mut again = GridLevel::new(config_id, 1, dec!(1600), OrderSide::Sell);
        again.save(&db).unwrap();
        assert_eq!(again.id, levels[1].id);
        assert_eq!(GridLevel::list_by_config(&db, config_id).unwrap().len(), 2);

        assert_eq!(GridLevel::delete_by_config(&db, config_id).unwrap(), 2);
    }
}
