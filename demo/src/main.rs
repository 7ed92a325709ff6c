use std::collections::HashMap;
use std::path::Path;

use rand::Rng;
use rect_packer::image::Rgba;
use rect_packer::image_store::ImageStoreManager;
use rect_packer::{PackerOptions, Rect, RectanglePacker};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let options = match std::env::args().nth(1) {
        Some(path) => PackerOptions::open(path)?,
        None => PackerOptions {
            width: 64,
            height: 64,
            compaction_threshold: Some(0.5),
            ..Default::default()
        },
    };
    let mut packer = RectanglePacker::with_options(ImageStoreManager::new(), options)?;
    let mut rng = rand::thread_rng();
    let mut live = Vec::new();

    for i in 0..300 {
        // Churn a little so freed spans, compaction and growth all get exercised.
        if !live.is_empty() && rng.gen_bool(0.3) {
            let id = live.swap_remove(rng.gen_range(0..live.len()));
            let removed = packer.remove(id)?;
            log::debug!("removed {}", removed.payload());
            continue;
        }

        let (w, h) = (rng.gen_range(4..48), rng.gen_range(4..32));
        let name = format!("sprite-{i:03}");
        let id = packer.add(Rect::sized(w, h, name)?)?;
        let color = Rgba([rng.gen(), rng.gen(), rng.gen(), 255]);
        let rect = packer
            .get(id)
            .map(Rect::geometry)
            .ok_or_else(|| anyhow::anyhow!("{id:?} vanished after add"))?;
        let (store, manager) = packer.store_and_manager()?;
        manager.fill(*store, &rect, color)?;
        live.push(id);
    }

    let used: i64 = packer.iter().map(|(_, r)| r.area()).sum();
    let total = packer.width() as i64 * packer.height() as i64;
    log::info!(
        "packed {} rects into {}x{} ({:.0}% used, fragmentation {:.2})",
        packer.len(),
        packer.width(),
        packer.height(),
        100.0 * used as f64 / total.max(1) as f64,
        packer.vertical_fragmentation_ratio()
    );

    let out = Path::new("target");
    std::fs::create_dir_all(out)?;
    let (store, manager) = packer.store_and_manager()?;
    manager.save(*store, out.join("atlas.png"))?;

    let names: HashMap<String, _> = packer
        .iter()
        .map(|(id, r)| (r.payload().clone(), id))
        .collect();
    let manifest = serde_json::json!({
        "layout": packer.layout(),
        "names": names,
    });
    std::fs::write(out.join("atlas.json"), serde_json::to_string_pretty(&manifest)?)?;

    packer.dispose();
    Ok(())
}
