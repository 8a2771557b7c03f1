use anyhow::{Context, Result};
use sqlx::SqlitePool;
use std::path::Path;

use crate::db::insert_kaggle_boxscores;
use crate::models::KaggleBoxscore;

/// Loads the historical competition boxscores from
/// `MRegularSeasonDetailedResults.csv` (extracted from the competition
/// archive) into `boxscores_kaggle`. Rows are inserted once and never
/// mutated afterwards.
pub async fn load_kaggle_csv(pool: &SqlitePool, path: &Path) -> Result<usize> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut rows: Vec<KaggleBoxscore> = Vec::new();
    for record in reader.deserialize() {
        let row: KaggleBoxscore = record.context("malformed boxscore row")?;
        rows.push(row);
    }

    insert_kaggle_boxscores(pool, &rows).await?;
    tracing::info!("Loaded {} boxscores from {}", rows.len(), path.display());
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, init_database_with_pool};
    use std::io::Write;

    const HEADER: &str = "Season,DayNum,WTeamID,WScore,LTeamID,LScore,WLoc,NumOT,\
WFGM,WFGA,WFGM3,WFGA3,WFTM,WFTA,WOR,WDR,WAst,WTO,WStl,WBlk,WPF,\
LFGM,LFGA,LFGM3,LFGA3,LFTM,LFTA,LOR,LDR,LAst,LTO,LStl,LBlk,LPF";

    #[tokio::test]
    async fn csv_rows_land_in_boxscores_kaggle() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_database_with_pool(&pool).await.unwrap();

        let dir = std::env::temp_dir().join(format!("hoopcast-csv-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("detailed_results.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "{}", HEADER).unwrap();
        writeln!(
            f,
            "2024,40,1101,75,1202,70,N,0,28,60,7,21,12,16,11,24,15,12,6,3,18,26,58,8,24,10,14,8,21,13,14,7,2,19"
        )
        .unwrap();
        drop(f);

        let n = load_kaggle_csv(&pool, &path).await.unwrap();
        assert_eq!(n, 1);
        assert_eq!(count_rows(&pool, "boxscores_kaggle").await.unwrap(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }
}
