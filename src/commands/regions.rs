//! Regions command - list regions present in the replica

use crate::error::Result;
use crate::meta::SyncStore;
use crate::models::Region;
use tracing::info;

/// List known regions without syncing
pub async fn cmd_regions(store: &SyncStore, parent_region: Option<&str>) -> Result<Vec<Region>> {
    info!("Listing regions");
    store.list_regions(parent_region).await
}

/// Print regions grouped by parent region
pub fn print_regions(regions: &[Region]) {
    if regions.is_empty() {
        println!("No regions stored. Run 'countysync sync' first.");
        return;
    }

    let mut current: Option<&str> = None;
    for region in regions {
        if current != Some(region.parent_region_name.as_str()) {
            println!("\n{}", region.parent_region_name);
            current = Some(region.parent_region_name.as_str());
        }
        println!("  • {}", region.region_name);
    }
}
