//! 機械学習モデルの共通定義
//!
//! 表形式データ分類用の全結合ネットワークと関連する設定を提供します。

#[cfg(feature = "ml")]
use burn::{
    config::Config,
    module::Module,
    nn::{
        loss::{BinaryCrossEntropyLossConfig, CrossEntropyLossConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{activation, backend::Backend, Int, Tensor},
};
#[cfg(feature = "ml")]
use log::debug;

/// 中間層の幅
pub const HIDDEN_LAYERS: [usize; 4] = [128, 64, 32, 16];

/// モデル設定
#[cfg(feature = "ml")]
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// 特徴量の数
    pub input_dim: usize,
    /// 出力層の幅（1なら2値分類）
    pub output_width: usize,
    /// ドロップアウト率
    #[config(default = 0.2)]
    pub dropout: f64,
}

#[cfg(feature = "ml")]
impl ClassifierConfig {
    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> TabularClassifier<B> {
        let [h1, h2, h3, h4] = HIDDEN_LAYERS;

        debug!(
            "[Model] {} -> {} -> {} -> {} -> {} -> {}",
            self.input_dim, h1, h2, h3, h4, self.output_width
        );

        TabularClassifier {
            fc1: LinearConfig::new(self.input_dim, h1).init(device),
            fc2: LinearConfig::new(h1, h2).init(device),
            fc3: LinearConfig::new(h2, h3).init(device),
            fc4: LinearConfig::new(h3, h4).init(device),
            output: LinearConfig::new(h4, self.output_width).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            activation: Relu::new(),
        }
    }

    /// 2値分類（出力幅1）かどうか
    pub fn is_binary(&self) -> bool {
        self.output_width == 1
    }
}

/// 表形式データ分類用の全結合モデル
///
/// # アーキテクチャ
/// - FC: input_dim -> 128 + ReLU + Dropout
/// - FC: 128 -> 64 + ReLU + Dropout
/// - FC: 64 -> 32 + ReLU
/// - FC: 32 -> 16 + ReLU
/// - FC: 16 -> output_width
///   - 出力幅1: シグモイド（2値分類）
///   - それ以外: ソフトマックス（多クラス分類）
#[cfg(feature = "ml")]
#[derive(Module, Debug)]
pub struct TabularClassifier<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    fc3: Linear<B>,
    fc4: Linear<B>,
    output: Linear<B>,

    dropout: Dropout,
    activation: Relu,
}

#[cfg(feature = "ml")]
impl<B: Backend> TabularClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `features`: 標準化済みの特徴量 [batch_size, input_dim]
    ///
    /// # 戻り値
    /// - ロジット [batch_size, output_width]
    pub fn forward(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.fc1.forward(features));
        let x = self.dropout.forward(x);

        let x = self.activation.forward(self.fc2.forward(x));
        let x = self.dropout.forward(x);

        let x = self.activation.forward(self.fc3.forward(x));
        let x = self.activation.forward(self.fc4.forward(x));

        self.output.forward(x)
    }

    /// 順伝播と損失計算
    ///
    /// 出力幅1の場合はロジット付き2値交差エントロピー、
    /// それ以外はクロスエントロピーを使います。
    ///
    /// # 戻り値
    /// - (損失, ロジット)
    pub fn forward_loss(
        &self,
        features: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = self.forward(features);
        let device = logits.device();
        let [batch_size, width] = logits.dims();

        let loss = if width == 1 {
            BinaryCrossEntropyLossConfig::new()
                .with_logits(true)
                .init(&device)
                .forward(logits.clone().reshape([batch_size]), targets)
        } else {
            CrossEntropyLossConfig::new()
                .init(&device)
                .forward(logits.clone(), targets)
        };

        (loss, logits)
    }

    /// クラスごとの確率
    ///
    /// 出力幅1の場合は正例（クラス1）の確率 [batch_size, 1] を返します。
    pub fn probabilities(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        let logits = self.forward(features);
        let [_, width] = logits.dims();
        if width == 1 {
            activation::sigmoid(logits)
        } else {
            activation::softmax(logits, 1)
        }
    }
}

/// ロジット（行優先で平坦化）から予測クラスを求める
///
/// 出力幅1の場合はロジットが正ならクラス1（シグモイド出力 > 0.5 と同値）。
pub fn classes_from_logits(logits: &[f32], width: usize) -> Vec<usize> {
    if width <= 1 {
        return logits.iter().map(|&v| usize::from(v > 0.0)).collect();
    }
    logits
        .chunks(width)
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
                .0
        })
        .collect()
}
