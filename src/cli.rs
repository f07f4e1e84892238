// ============================================================================
// lasso-edit CLI — 单次局部编辑
// ============================================================================
//
// 用法示例：
//   lasso-edit --image photo.png --point 100,100 --point 300,100 --point 200,300 \
//              --instruction "add a bench"
//   lasso-edit --image https://cdn.example.com/a.png --display-size 400x300 \
//              --point 50,50 --point 150,50 --point 100,150 --mask-preview mask.png
//
// 点坐标默认按图片自然分辨率解释；给出 --display-size 时按显示尺寸解释，
// 并经坐标映射换算为图片坐标。

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use lasso_edit::edit::{EditFailure, EditRecord, EditService, ImageRef, SizeHint};
use lasso_edit::error::AppError;
use lasso_edit::selection::{DisplayPoint, DisplayRect, ImageSize, Surface};
use lasso_edit::settings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// 在图片的套索选区内执行一次 AI 局部编辑。
#[derive(Parser, Debug)]
#[command(
    name = "lasso-edit",
    version,
    about = "Apply one AI edit inside a lasso-selected region of an image"
)]
pub struct CliArgs {
    /// 原图：HTTP(S) 地址、本地文件路径或 `data:image/...;base64,` 字符串。
    #[arg(long, value_name = "URL|PATH|DATA_URL")]
    pub image: String,

    /// 套索顶点 `X,Y`，按顺序给出，至少 3 个。
    #[arg(long = "point", value_name = "X,Y", value_parser = parse_point, required = true)]
    pub points: Vec<(f64, f64)>,

    /// 点坐标所在的显示尺寸 `WxH`；省略时点坐标即图片坐标。
    #[arg(long, value_name = "WxH", value_parser = parse_display_size)]
    pub display_size: Option<(f64, f64)>,

    /// 编辑指令，允许为空。
    #[arg(long, default_value = "")]
    pub instruction: String,

    /// 输出尺寸提示：`natural` 或 `WxH`；省略时使用配置默认值。
    #[arg(long, value_name = "natural|WxH")]
    pub size: Option<SizeHint>,

    /// 配置文件（JSON）。
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// 覆盖配置中的编辑服务地址。
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// 覆盖配置中相对结果地址的解析基准。
    #[arg(long, value_name = "URL")]
    pub asset_base: Option<String>,

    /// 允许访问内网 / 本地地址（本地开发服务需要）。
    #[arg(long)]
    pub allow_private_network: bool,

    /// 把蒙版预览写入该 PNG 文件。
    #[arg(long, value_name = "FILE")]
    pub mask_preview: Option<PathBuf>,
}

fn parse_point(raw: &str) -> Result<(f64, f64), String> {
    let (x, y) = raw
        .split_once(',')
        .ok_or_else(|| format!("坐标格式应为 X,Y：{}", raw))?;
    let x: f64 = x.trim().parse().map_err(|_| format!("无效的 X 坐标：{}", x))?;
    let y: f64 = y.trim().parse().map_err(|_| format!("无效的 Y 坐标：{}", y))?;

    if !x.is_finite() || !y.is_finite() {
        return Err(format!("坐标必须是有限数值：{}", raw));
    }
    Ok((x, y))
}

fn parse_display_size(raw: &str) -> Result<(f64, f64), String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("显示尺寸格式应为 WxH：{}", raw))?;
    let w: f64 = w.trim().parse().map_err(|_| format!("无效的宽度：{}", w))?;
    let h: f64 = h.trim().parse().map_err(|_| format!("无效的高度：{}", h))?;

    if !(w > 0.0 && h > 0.0) {
        return Err(format!("显示尺寸必须为正数：{}", raw));
    }
    Ok((w, h))
}

// ============================================================================
// Public entry point
// ============================================================================

/// 执行一次编辑并输出结果。`0` = 成功，`1` = 失败。
pub async fn run(args: CliArgs) -> ExitCode {
    match run_edit(args).await {
        Ok(record) => {
            let output = serde_json::json!({
                "result": record.result.to_src(),
                "record": record,
            });
            match serde_json::to_string_pretty(&output) {
                Ok(text) => {
                    println!("{}", text);
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    eprintln!("error: 无法序列化结果：{}", err);
                    ExitCode::FAILURE
                }
            }
        }
        Err(AppError::Edit(err)) => {
            let failure = EditFailure::from(&err);
            eprintln!("error[{}] ({}): {}", failure.code, failure.stage, failure.message);
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run_edit(args: CliArgs) -> Result<EditRecord, AppError> {
    let mut config = match &args.config {
        Some(path) => settings::load_config(path)?,
        None => Default::default(),
    };
    if let Some(endpoint) = args.endpoint {
        config.endpoint_url = endpoint;
    }
    if let Some(base) = args.asset_base {
        config.asset_base_url = Some(base);
    }
    if args.allow_private_network {
        config.allow_private_network = true;
    }

    let service = EditService::with_config(config)?;

    let reference = parse_image_source(&args.image)?;
    let natural = service.mount_image(reference).await?;
    let surface = build_surface(args.display_size, natural);

    replay_points(&service, &surface, &args.points)?;
    service.close_selection()?;

    if let Some(path) = &args.mask_preview {
        let preview = service.preview_mask()?;
        std::fs::write(path, &preview.png)?;
        log::info!(
            "🎭 蒙版预览已写入 {} ({}，可编辑像素 {}/{})",
            path.display(),
            preview.preview_size,
            preview.mask.editable_pixels(),
            preview.mask.total_pixels()
        );
    }

    Ok(service.apply_edit(args.instruction, args.size).await?)
}

fn parse_image_source(raw: &str) -> Result<ImageRef, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Input("--image 不能为空".to_string()));
    }

    if trimmed.starts_with("data:") {
        return Ok(ImageRef::encoded(trimmed));
    }

    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Ok(ImageRef::locator(trimmed));
    }

    Ok(ImageRef::from_file(std::path::Path::new(trimmed))?)
}

fn build_surface(display_size: Option<(f64, f64)>, natural: ImageSize) -> Surface {
    match display_size {
        Some((width, height)) => Surface::new(DisplayRect::new(0.0, 0.0, width, height), natural),
        None => Surface::unscaled(natural),
    }
}

fn replay_points(service: &EditService, surface: &Surface, points: &[(f64, f64)]) -> Result<(), AppError> {
    let mut iter = points.iter().map(|(x, y)| DisplayPoint::new(*x, *y));

    if let Some(first) = iter.next() {
        service.pointer_down(surface, first)?;
    }
    for at in iter {
        service.pointer_move(surface, at)?;
    }
    service.pointer_up()?;

    Ok(())
}
