//! Configuration file support.

use std::{
    env, fmt,
    fs::{create_dir_all, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};
use toml_edit::{value, DocumentMut};

use crate::clouds::gcloud::bigquery::Labels;
use crate::common::*;
use crate::cost::UsdPerTb;
use crate::dataset::DatasetId;

/// Find the path to our configuration directory.
pub fn config_dir() -> Result<PathBuf> {
    // Use `var_os` instead of `var`, because if it returns a non-Unicode path,
    // we can hand it off directly to `PathBuf`.
    match env::var_os("BQSCRIPT_CONFIG_DIR") {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => Ok(dirs::config_dir()
            // AFAIK, this only fails under weird conditions, such as no home
            // directory.
            .ok_or_else(|| format_err!("could not find user config dir"))?
            .join("bqscript")),
    }
}

/// Find the path to our configuration file.
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("bqscript.toml"))
}

/// A key in `bqscript.toml`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Key {
    /// The dataset to run scripts against, as `project.dataset`.
    Dataset,
    /// On-demand price in dollars per TiB.
    UsdPerTb,
    /// The BigQuery location to run jobs in.
    Location,
}

impl Key {
    /// Every key we understand.
    pub fn all() -> &'static [Key] {
        &[Key::Dataset, Key::UsdPerTb, Key::Location]
    }

    /// The key as written in the TOML file.
    pub fn as_str(self) -> &'static str {
        match self {
            Key::Dataset => "dataset",
            Key::UsdPerTb => "usd_per_tb",
            Key::Location => "location",
        }
    }

    /// Parse a key name from the command line.
    pub fn from_name(name: &str) -> Result<Key> {
        Key::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == name)
            .ok_or_else(|| {
                let known = Key::all().iter().map(|k| k.as_str()).collect::<Vec<_>>();
                format_err!(
                    "unknown configuration key {:?} (expected one of: {})",
                    name,
                    known.join(", "),
                )
            })
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Our `bqscript.toml` configuration file.
#[derive(Debug)]
pub struct Configuration {
    /// The path from which we read this file.
    path: PathBuf,
    /// Our raw configuration data.
    doc: DocumentMut,
}

// We use `toml_edit` so that we can edit the file without losing whitespace or
// comments the user put there. The price is that everything is dynamically
// typed, so values get checked by hand below.
impl Configuration {
    /// Load our default configuration.
    pub fn try_default() -> Result<Self> {
        Self::from_path(&config_file()?)
    }

    /// Load the configuration file at `path`. A missing file is an empty
    /// configuration.
    pub fn from_path(path: &Path) -> Result<Self> {
        match File::open(path) {
            Ok(rdr) => Ok(Self::from_reader(path.to_owned(), rdr)
                .with_context(|| format!("could not read file {}", path.display()))?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self {
                path: path.to_owned(),
                doc: DocumentMut::default(),
            }),
            Err(err) => {
                Err(err).context(format!("could not open file {}", path.display()))
            }
        }
    }

    fn from_reader<R: Read>(path: PathBuf, mut rdr: R) -> Result<Self> {
        let mut buf = String::new();
        rdr.read_to_string(&mut buf)?;
        let doc = buf.parse::<DocumentMut>()?;
        Ok(Self { path, doc })
    }

    /// Where this configuration lives on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the configuration file to disk.
    pub fn write(&self) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            format_err!("cannot find parent directory of {}", self.path.display())
        })?;
        create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
        let data = self.doc.to_string();
        let mut f = File::create(&self.path)
            .with_context(|| format!("cannot create {}", self.path.display()))?;
        f.write_all(data.as_bytes())
            .with_context(|| format!("error writing to {}", self.path.display()))?;
        f.flush()
            .with_context(|| format!("error writing to {}", self.path.display()))?;
        Ok(())
    }

    /// Our default dataset, if one is configured.
    pub fn dataset(&self) -> Result<Option<DatasetId>> {
        self.string(Key::Dataset)?
            .map(|s| {
                s.parse::<DatasetId>()
                    .with_context(|| format!("bad {} in {}", Key::Dataset, self.path.display()))
            })
            .transpose()
    }

    /// Our configured price, if any.
    pub fn usd_per_tb(&self) -> Result<Option<UsdPerTb>> {
        match self.doc.as_table().get(Key::UsdPerTb.as_str()) {
            None => Ok(None),
            Some(item) => {
                let usd = item
                    .as_float()
                    .or_else(|| item.as_integer().map(|i| i as f64))
                    .ok_or_else(|| {
                        format_err!(
                            "expected number for {}, found {:?} in {}",
                            Key::UsdPerTb,
                            item.to_string().trim(),
                            self.path.display(),
                        )
                    })?;
                Ok(Some(UsdPerTb::new(usd)?))
            }
        }
    }

    /// Our configured BigQuery location, if any.
    pub fn location(&self) -> Result<Option<String>> {
        self.string(Key::Location)
    }

    fn string(&self, key: Key) -> Result<Option<String>> {
        match self.doc.as_table().get(key.as_str()) {
            None => Ok(None),
            Some(item) => match item.as_str() {
                Some(s) => Ok(Some(s.to_owned())),
                None => Err(format_err!(
                    "expected string for {}, found {:?} in {}",
                    key,
                    item.to_string().trim(),
                    self.path.display(),
                )),
            },
        }
    }

    /// Set `key` to `raw`, checking that `raw` makes sense for `key`.
    pub fn set(&mut self, key: Key, raw: &str) -> Result<()> {
        let item = match key {
            Key::Dataset => value(raw.parse::<DatasetId>()?.to_string()),
            Key::UsdPerTb => value(raw.parse::<UsdPerTb>()?.usd()),
            Key::Location => value(raw),
        };
        self.doc[key.as_str()] = item;
        Ok(())
    }

    /// Remove `key`, if present.
    pub fn unset(&mut self, key: Key) {
        self.doc.as_table_mut().remove(key.as_str());
    }

    /// Build the settings used to run scripts.
    pub fn run_config(&self) -> Result<RunConfig> {
        let defaults = RunConfig::default();
        Ok(RunConfig {
            default_dataset: self.dataset()?,
            usd_per_tb: self.usd_per_tb()?.unwrap_or(defaults.usd_per_tb),
            location: self.location()?.unwrap_or(defaults.location),
            labels: defaults.labels,
        })
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.doc)
    }
}

/// Settings shared by every statement in a run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    /// The dataset used when the caller doesn't name one.
    pub default_dataset: Option<DatasetId>,
    /// Price used to turn bytes into dollars.
    pub usd_per_tb: UsdPerTb,
    /// Where BigQuery should run our jobs.
    pub location: String,
    /// Labels to attach to every job.
    pub labels: Labels,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            default_dataset: None,
            usd_per_tb: UsdPerTb::default(),
            location: "US".to_owned(),
            labels: Labels::default(),
        }
    }
}

impl RunConfig {
    /// Pick `explicit` if present, otherwise our default dataset.
    pub fn dataset<'a>(&'a self, explicit: Option<&'a DatasetId>) -> Result<&'a DatasetId> {
        explicit.or(self.default_dataset.as_ref()).ok_or_else(|| {
            format_err!(
                "no dataset given: pass --dataset or run `bqscript config set dataset PROJECT.DATASET`"
            )
        })
    }
}
