use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Overrides the `data_dir` from the config file when set.
pub const ENV_DATA_DIR: &str = "BABYAHORRO_DATA_DIR";
/// Overrides the database file name from the config file when set.
pub const ENV_DB_FILE: &str = "BABYAHORRO_DB";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfigFile {
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub tiendas: Vec<StoreEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Directory holding the adapter output files, the database and the
    /// consolidated export.
    pub data_dir: PathBuf,
    pub db_file: String,
    pub consolidated_file: String,
    pub report_file: PathBuf,
}

/// One scraper adapter the pipeline consumes. `archivo` is resolved
/// relative to `data_dir`; `url_base` is the store's site root, persisted
/// on its store row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEntry {
    pub nombre: String,
    pub url_base: String,
    pub archivo: String,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub pipeline: PipelineSection,
    pub tiendas: Vec<StoreEntry>,
}

impl PipelineConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config file: {}", path))?;

        let config_file: PipelineConfigFile = toml::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline config file: {}", path))?;

        let mut config = Self {
            pipeline: config_file.pipeline,
            tiendas: config_file.tiendas,
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Environment beats file so one deployment can point several runs at
    /// different data directories without editing the config.
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var(ENV_DATA_DIR)
            && !dir.is_empty()
        {
            self.pipeline.data_dir = PathBuf::from(dir);
        }
        if let Ok(file) = env::var(ENV_DB_FILE)
            && !file.is_empty()
        {
            self.pipeline.db_file = file;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.db_file.is_empty() {
            return Err(anyhow::anyhow!("Database file name cannot be empty"));
        }

        if self.pipeline.consolidated_file.is_empty() {
            return Err(anyhow::anyhow!("Consolidated file name cannot be empty"));
        }

        if self.tiendas.is_empty() {
            return Err(anyhow::anyhow!("At least one store must be configured"));
        }

        for tienda in &self.tiendas {
            if tienda.nombre.is_empty() {
                return Err(anyhow::anyhow!("Store entry with empty name"));
            }
            if tienda.archivo.is_empty() {
                return Err(anyhow::anyhow!(
                    "Store {} has no adapter output file",
                    tienda.nombre
                ));
            }
        }

        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        self.pipeline.data_dir.join(&self.pipeline.db_file)
    }

    pub fn consolidated_path(&self) -> PathBuf {
        self.pipeline.data_dir.join(&self.pipeline.consolidated_file)
    }

    pub fn report_path(&self) -> &Path {
        &self.pipeline.report_file
    }

    pub fn store_file(&self, entry: &StoreEntry) -> PathBuf {
        self.pipeline.data_dir.join(&entry.archivo)
    }

    /// Store name to site root, the shape the persistence layer wants when
    /// it first creates a store row.
    pub fn base_urls(&self) -> HashMap<String, String> {
        self.tiendas
            .iter()
            .map(|t| (t.nombre.clone(), t.url_base.clone()))
            .collect()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let tiendas = [
            ("Liquimax", "https://www.liquimax.cl", "liquimax_precios.json"),
            (
                "Distribuidora Pepito",
                "https://www.distribuidorapepito.cl",
                "pepito_precios.json",
            ),
            (
                "La Pañalera",
                "https://www.lapanalera.cl",
                "lapanalera_precios.json",
            ),
            (
                "Pañales Tin Tin",
                "https://www.panalestintin.cl",
                "tintin_precios.json",
            ),
            (
                "Santa Isabel",
                "https://www.santaisabel.cl",
                "santaisabel_precios.json",
            ),
            ("Jumbo", "https://www.jumbo.cl", "jumbo_precios.json"),
            (
                "Farmacias Ahumada",
                "https://www.farmaciasahumada.cl",
                "ahumada_precios.json",
            ),
            (
                "Cruz Verde",
                "https://www.cruzverde.cl",
                "cruzverde_precios.json",
            ),
        ];

        Self {
            pipeline: PipelineSection {
                data_dir: PathBuf::from("data"),
                db_file: "precios.db".to_string(),
                consolidated_file: "precios_consolidados.csv".to_string(),
                report_file: PathBuf::from("analysis/reporte.txt"),
            },
            tiendas: tiendas
                .into_iter()
                .map(|(nombre, url_base, archivo)| StoreEntry {
                    nombre: nombre.to_string(),
                    url_base: url_base.to_string(),
                    archivo: archivo.to_string(),
                })
                .collect(),
        }
    }
}
