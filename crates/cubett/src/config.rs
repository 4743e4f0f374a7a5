use alloc::sync::Arc;

/// Static mutex holding the global configuration, initialized as `None`.
static CUBETT_GLOBAL_CONFIG: spin::Mutex<Option<Arc<GlobalConfig>>> = spin::Mutex::new(None);

/// Global configuration of the launch planner and its occupancy cache.
#[derive(Default, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GlobalConfig {
    /// Configuration of the launch planner.
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Configuration of the occupancy cache.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Launch planner settings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlannerConfig {
    /// Cubes scheduled per streaming multiprocessor by the packed strategies.
    #[serde(default = "packed_cubes_per_sm_default")]
    pub packed_cubes_per_sm: u32,

    /// Cubes scheduled per streaming multiprocessor by the tiled strategies.
    #[serde(default = "tiled_cubes_per_sm_default")]
    pub tiled_cubes_per_sm: u32,

    /// Verbosity of the planner diagnostics.
    #[serde(default)]
    pub logger: PlannerLogLevel,
}

/// Occupancy cache settings.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CacheConfig {
    /// Entries kept before the least recently used one is replaced.
    #[serde(default = "capacity_default")]
    pub capacity: usize,
}

/// Verbosity of the planner diagnostics.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PlannerLogLevel {
    /// Nothing is logged.
    #[serde(rename = "disabled")]
    Disabled,
    /// Selected configurations and infeasibility are logged.
    #[default]
    #[serde(rename = "basic")]
    Basic,
    /// Every scanned candidate is logged as well.
    #[serde(rename = "full")]
    Full,
}

fn packed_cubes_per_sm_default() -> u32 {
    18
}

fn tiled_cubes_per_sm_default() -> u32 {
    8
}

fn capacity_default() -> usize {
    100_000
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            packed_cubes_per_sm: packed_cubes_per_sm_default(),
            tiled_cubes_per_sm: tiled_cubes_per_sm_default(),
            logger: PlannerLogLevel::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: capacity_default(),
        }
    }
}

impl GlobalConfig {
    /// Retrieves the current global configuration, loading it if not set.
    ///
    /// If no configuration is set, it attempts to load one from `cubett.toml` in the current
    /// directory or its parents, then applies the environment overrides. If no file is found, a
    /// default configuration is used.
    pub fn get() -> Arc<Self> {
        let mut state = CUBETT_GLOBAL_CONFIG.lock();

        match state.as_ref() {
            Some(config) => config.clone(),
            None => {
                let config = Arc::new(Self::from_current_dir().override_from_env());
                *state = Some(config.clone());
                config
            }
        }
    }

    /// Sets the global configuration to the provided value.
    ///
    /// # Panics
    /// Panics if the configuration has already been set or read, as it cannot be overridden.
    pub fn set(config: Self) {
        let mut state = CUBETT_GLOBAL_CONFIG.lock();
        if state.is_some() {
            panic!("Cannot set the global configuration multiple times.");
        }
        *state = Some(Arc::new(config));
    }

    /// Overrides configuration fields based on environment variables.
    pub fn override_from_env(mut self) -> Self {
        if let Ok(val) = std::env::var("CUBETT_CACHE_CAPACITY") {
            match val.parse::<usize>() {
                Ok(capacity) if capacity > 0 => self.cache.capacity = capacity,
                _ => log::warn!("Ignoring CUBETT_CACHE_CAPACITY={val}, expected a positive size"),
            }
        }

        if let Ok(val) = std::env::var("CUBETT_PLANNER_LOG") {
            match val.as_str() {
                "0" | "false" | "disabled" => self.planner.logger = PlannerLogLevel::Disabled,
                "1" | "true" | "basic" => self.planner.logger = PlannerLogLevel::Basic,
                "full" => self.planner.logger = PlannerLogLevel::Full,
                _ => {}
            }
        }

        self
    }

    /// Parse a configuration from the content of a `cubett.toml` file.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    // Traverses up the directory tree until a configuration file is found or the root is reached.
    fn from_current_dir() -> Self {
        let Ok(mut dir) = std::env::current_dir() else {
            return Self::default();
        };

        loop {
            if let Ok(content) = Self::from_file_path(dir.join("cubett.toml")) {
                return content;
            }

            if !dir.pop() {
                break;
            }
        }

        Self::default()
    }

    fn from_file_path<P: AsRef<std::path::Path>>(path: P) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = match Self::from_toml(&content) {
            Ok(val) => val,
            Err(err) => panic!("The file provided doesn't have the right format => {err:?}"),
        };

        Ok(config)
    }
}
