//! Sample grids written during DCGAN training.
use crate::error::{GanError, Result};
use std::path::Path;
use tch::{Device, Kind, Tensor};

/// Tiles a `[N, C, H, W]` batch of images with values in `[0, 1]` into a
/// single `[C, rows * H, columns * W]` uint8 image. Missing cells are black.
pub fn image_grid(imgs: &Tensor, columns: i64) -> Result<Tensor> {
    let size = imgs.size();
    if size.len() != 4 || columns <= 0 {
        return Err(GanError::Shape(format!(
            "expected [N, C, H, W] images and positive columns, got {size:?} and {columns}"
        )));
    }
    let (n, c, h, w) = (size[0], size[1], size[2], size[3]);
    let rows = (n + columns - 1) / columns;
    let imgs = (imgs.to_device(Device::Cpu) * 255.).clamp(0., 255.).to_kind(Kind::Uint8);
    let missing = rows * columns - n;
    let imgs = if missing > 0 {
        let blank = Tensor::zeros([missing, c, h, w], (Kind::Uint8, Device::Cpu));
        Tensor::cat(&[imgs, blank], 0)
    } else {
        imgs
    };
    Ok(imgs
        .view([rows, columns, c, h, w])
        .permute([2, 0, 3, 1, 4])
        .contiguous()
        .view([c, rows * h, columns * w]))
}

/// Writes an image grid, the format being picked from the file extension.
pub fn save_grid<T: AsRef<Path>>(imgs: &Tensor, columns: i64, path: T) -> Result<()> {
    let grid = image_grid(imgs, columns)?;
    tch::vision::image::save(&grid, path.as_ref())?;
    Ok(())
}
