pub struct Icons;

impl Icons {
    pub const PIN: &str = "📍";
    pub const GLOBE: &str = "🌍";
    pub const SEARCH: &str = "🔍";
    pub const CHECK: &str = "✅";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const STATS: &str = "📊";
    pub const DATABASE: &str = "🗄️";
    pub const GEAR: &str = "⚙️";
    pub const COMPASS: &str = "🧭";
}
