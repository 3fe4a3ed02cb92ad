use alloy::sol;

sol! {
    #[sol(rpc)]
    contract MessageBoard {
        struct Message {
            uint256 id;
            address author;
            string text;
            uint256 likes;
            uint256 timestamp;
        }

        event MessageCreated(
            uint256 indexed id,
            address indexed author,
            string text,
            uint256 timestamp
        );

        event MessageLiked(
            uint256 indexed id,
            address indexed liker
        );

        function writeMessage(string _text) external;
        function likeMessage(uint256 _id) external;
        function getMessage(uint256 _id) external view returns (Message memory);
    }
}
