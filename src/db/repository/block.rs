use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::BlockSource;
use crate::models::{BoundingRegion, ExtractedBlock};

/// Replace the stored block sequence of a paper.
pub fn replace_blocks(
    conn: &Connection,
    paper_id: &Uuid,
    blocks: &[ExtractedBlock],
) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM extracted_blocks WHERE paper_id = ?1",
        params![paper_id.to_string()],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO extracted_blocks (paper_id, order_index, page_no, text, x, y, width, height,
         confidence, source)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    for block in blocks {
        stmt.execute(params![
            paper_id.to_string(),
            block.order_index,
            block.page_no,
            block.text,
            block.region.x,
            block.region.y,
            block.region.width,
            block.region.height,
            block.confidence,
            block.source.as_str(),
        ])?;
    }
    Ok(())
}

/// Stored blocks in reading order. Empty when the paper was never extracted.
pub fn get_blocks(conn: &Connection, paper_id: &Uuid) -> Result<Vec<ExtractedBlock>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT order_index, page_no, text, x, y, width, height, confidence, source
         FROM extracted_blocks WHERE paper_id = ?1 ORDER BY order_index",
    )?;

    let rows = stmt.query_map(params![paper_id.to_string()], |row| {
        Ok((
            row.get::<_, u32>(0)?,
            row.get::<_, u32>(1)?,
            row.get::<_, String>(2)?,
            BoundingRegion {
                x: row.get(3)?,
                y: row.get(4)?,
                width: row.get(5)?,
                height: row.get(6)?,
            },
            row.get::<_, f32>(7)?,
            row.get::<_, String>(8)?,
        ))
    })?;

    let mut blocks = Vec::new();
    for row in rows {
        let (order_index, page_no, text, region, confidence, source) = row?;
        blocks.push(ExtractedBlock {
            paper_id: *paper_id,
            page_no,
            order_index,
            text,
            region,
            confidence,
            source: BlockSource::from_str(&source)?,
        });
    }
    Ok(blocks)
}
