use std::io;

/// Default number of pre-allocated session contexts
pub const DEFAULT_POOL_CAPACITY: usize = 16;
/// Default maximum number of simultaneously open sessions
pub const DEFAULT_MAX_SESSIONS: usize = 256;
/// Default upper bound on the number of identifiers in a filter list
pub const DEFAULT_MAX_FILTER_IDS: usize = 65536;
/// Default per-reader backlog of the memory queue
pub const DEFAULT_QUEUE_MAX_BLOCKS: usize = 4096;
/// Default maximum number of readers registered with the memory queue
pub const DEFAULT_MAX_READERS: usize = 64;

/// Key/value configuration, backed by a TOML document
#[derive(Clone, Debug)]
pub struct Config {
    value: toml::Value,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            value: toml::Value::Table(toml::map::Map::new()),
        }
    }
}

impl Config {
    fn lookup(&self, k: &str) -> Option<&toml::Value> {
        let mut item = &self.value;
        for key in k.split('.') {
            item = item.get(key)?;
        }
        Some(item)
    }

    /// Get an entry by path. If the input argument contains dots, the path is split
    /// into keys, each key being requested recursively.
    pub fn get<T: AsRef<str>>(&self, k: T) -> Option<&str> {
        self.lookup(k.as_ref())?.as_str()
    }

    /// Get an entry of type integer by path
    pub fn get_usize<T: AsRef<str>>(&self, k: T) -> Option<usize> {
        self.lookup(k.as_ref())?
            .as_integer()
            .and_then(|i| usize::try_from(i).ok())
    }

    /// Get an entry of type integer by path, if it fits in 32 bits
    pub fn get_u32<T: AsRef<str>>(&self, k: T) -> Option<u32> {
        self.lookup(k.as_ref())?
            .as_integer()
            .and_then(|i| u32::try_from(i).ok())
    }

    /// Set an entry by path, creating intermediate tables when needed.
    ///
    /// Returns the previous value, if any.
    pub fn set<T: AsRef<str>, V: Into<toml::Value>>(&mut self, k: T, v: V) -> Option<toml::Value> {
        let mut keys: Vec<&str> = k.as_ref().split('.').collect();
        let last = keys.pop()?;
        let mut table = self.value.as_table_mut()?;
        for key in keys {
            let entry = table
                .entry(key.to_owned())
                .or_insert(toml::Value::Table(toml::map::Map::new()));
            table = entry.as_table_mut()?;
        }
        table.insert(last.to_owned(), v.into())
    }

    /// Load configuration from input object. If keys are already present, they are overwritten
    pub fn load_config<R: io::Read>(&mut self, mut config: R) -> Result<(), io::Error> {
        let mut s = String::new();
        config.read_to_string(&mut s)?;
        let table = toml::from_str::<toml::Table>(&s).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Load configuration failed: {e}"),
            )
        })?;
        match self.value.as_table_mut() {
            Some(current) => current.extend(table),
            None => self.value = toml::Value::Table(table),
        }
        Ok(())
    }

    pub fn pool_capacity(&self) -> usize {
        self.get_usize("pool_capacity")
            .unwrap_or(DEFAULT_POOL_CAPACITY)
    }

    pub fn max_sessions(&self) -> usize {
        self.get_usize("max_sessions").unwrap_or(DEFAULT_MAX_SESSIONS)
    }

    pub fn max_filter_ids(&self) -> usize {
        self.get_usize("max_filter_ids")
            .unwrap_or(DEFAULT_MAX_FILTER_IDS)
    }

    /// Snap length given to new sessions (0: disabled)
    pub fn snap_length(&self) -> u32 {
        self.get_u32("snap_length").unwrap_or(0)
    }

    pub fn queue_max_blocks(&self) -> usize {
        self.get_usize("queue_max_blocks")
            .unwrap_or(DEFAULT_QUEUE_MAX_BLOCKS)
    }

    pub fn max_readers(&self) -> usize {
        self.get_usize("max_readers").unwrap_or(DEFAULT_MAX_READERS)
    }
}
